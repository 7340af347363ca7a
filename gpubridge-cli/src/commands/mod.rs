pub mod inspect_cmd;
pub mod probe_cmd;
pub mod run_cmd;
