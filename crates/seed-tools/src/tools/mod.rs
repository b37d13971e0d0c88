pub mod edit_file;
pub mod glob_tool;
pub mod grep_tool;
pub mod list_files;
pub mod read_file;
pub mod run_command;
