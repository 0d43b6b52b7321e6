pub mod automation_logs;
