use std::path::PathBuf;

use chatline_client::SettingsError;
use chatline_sync::ServiceError;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("failed to write initial settings to {path:?} on `{stage}`: {source}"))]
    InitConfig {
        stage: &'static str,
        path: PathBuf,
        source: SettingsError,
    },
    #[snafu(display("failed to set up the chat client on `{stage}`: {source}"))]
    Client {
        stage: &'static str,
        source: ServiceError,
    },
    #[snafu(display("failed to start the async runtime on `{stage}`: {source}"))]
    Runtime {
        stage: &'static str,
        source: std::io::Error,
    },
    #[snafu(display("failed to read input on `{stage}`: {source}"))]
    ReadInput {
        stage: &'static str,
        source: std::io::Error,
    },
}
