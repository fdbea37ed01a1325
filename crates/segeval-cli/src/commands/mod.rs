pub mod check;
pub mod order;
pub mod run;
pub mod seed;
pub mod status;
