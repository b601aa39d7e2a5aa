mod client;
mod provider;
mod types;

#[cfg(test)]
mod tests;

pub use provider::GitHubProvider;

pub const DEFAULT_BASE_URL: &str = "https://api.github.com";
