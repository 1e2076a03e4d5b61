use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum DeployError {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config from {path}: {message}")]
    ConfigParse { path: String, message: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("cluster API request failed: {message}")]
    Api { message: String },

    #[error("remote transport error: {message}")]
    Transport { message: String },

    /// A remote command's output indicated failure. Carries both streams
    /// verbatim so the remote tool's behavior can be diagnosed without
    /// re-running the command.
    #[error("{context}\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}")]
    CommandInvocation {
        context: String,
        stdout: String,
        stderr: String,
    },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cancelled")]
    PromptCancelled,
}
