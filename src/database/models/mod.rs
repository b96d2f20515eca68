pub mod project;
pub mod secret;
pub mod token;
pub mod worker;

pub use project::{is_valid_project_name, NewProject, Project, ProjectData, ProjectStatus};
pub use secret::{is_valid_secret_key, NewSecret, Secret};
pub use token::{NewToken, Token};
pub use worker::{NewWorker, Worker, WorkerData, WorkerStatus};
