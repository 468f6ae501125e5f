pub mod absence_status;
pub mod attendance;
pub mod credential;
pub mod employee;
pub mod role;
