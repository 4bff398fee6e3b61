pub mod scripted_runner;
pub mod test_host;
