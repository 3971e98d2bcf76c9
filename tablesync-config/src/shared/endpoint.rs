use serde::{Deserialize, Serialize};
use sqlx::mysql::MySqlConnectOptions;

use crate::SerializableSecretString;

/// Connection parameters for one side of a source/target pair.
///
/// The same shape describes both the master and the slave database; the sync
/// tool receives it serialized as a `h=,u=,p=,P=,D=` descriptor with a
/// table-scoping key appended per invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DbEndpointConfig {
    /// Hostname or IP address of the database server.
    pub host: String,
    /// Port number on which the database server is listening.
    pub port: u16,
    /// Name of the database to sync tables in.
    pub database: String,
    /// Username for authenticating with the database server.
    pub username: String,
    /// Password for the specified user. Sensitive and redacted in debug output.
    pub password: Option<SerializableSecretString>,
}

/// A trait which converts an endpoint into crate specific connect options.
///
/// The statistics provider talks to the master over sqlx, so the connection
/// parameters are kept centralized in [`DbEndpointConfig`] and converted here
/// rather than duplicated at the call site.
pub trait IntoConnectOptions<Output> {
    /// Creates connection options for connecting to the configured database.
    fn with_db(&self) -> Output;
}

impl IntoConnectOptions<MySqlConnectOptions> for DbEndpointConfig {
    fn with_db(&self) -> MySqlConnectOptions {
        let options = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .database(&self.database);

        if let Some(password) = &self.password {
            options.password(password.expose_secret())
        } else {
            options
        }
    }
}
