mod client;
mod provider;
mod types;


pub use provider::GitLabProvider;

pub const DEFAULT_BASE_URL: &str = "https://gitlab.com";
