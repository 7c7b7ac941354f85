pub mod check;
pub mod inherit;
pub mod policy;
pub mod role;
pub mod seed;
pub mod status;
