pub mod channels;
pub mod epoch;
pub mod health;
pub mod live;
