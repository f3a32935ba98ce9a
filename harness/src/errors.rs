// Copyright 2026 Maurice S. Barnum
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
#[non_exhaustive]
pub enum Error {
    /// The store could not be reached
    #[error("Connection error ({endpoint}): {message}")]
    Connection { endpoint: String, message: String },

    /// A write was rejected, possibly after part of it was applied
    #[error("Write error on {collection}: {message} ({inserted} written)")]
    Write {
        collection: String,
        inserted: usize,
        message: String,
    },

    #[error("Query error on {collection}: {message}")]
    Query { collection: String, message: String },

    #[error("Admin command failed: {0}")]
    Admin(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Benchmark run already exists: {0}")]
    DuplicateRun(String),

    #[error("Benchmark run not found: {0}")]
    RunNotFound(String),

    #[error("Worker stopped without completing: {0}")]
    WorkerAborted(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Shared error: {0}")]
    Shared(#[source] Arc<Error>),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl Error {
    pub fn connection(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Connection {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn write(collection: impl Into<String>, inserted: usize, message: impl Into<String>) -> Self {
        Error::Write {
            collection: collection.into(),
            inserted,
            message: message.into(),
        }
    }

    pub fn query(collection: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Query {
            collection: collection.into(),
            message: message.into(),
        }
    }

    pub fn admin(message: impl Into<String>) -> Self {
        Error::Admin(message.into())
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfiguration(message.into())
    }

    /// Whether the error must abort the run.
    ///
    /// Only a rejected write is tolerated, and only where the caller treats the write as best
    /// effort (bulk inserts during the load phase). Everything else stops the process.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Write { .. } => false,
            Error::Shared(e) => e.is_fatal(),
            _ => true,
        }
    }

    /// The underlying error, looking through any sharing wrappers
    pub fn root(&self) -> &Error {
        match self {
            Error::Shared(e) => e.root(),
            other => other,
        }
    }

    /// Number of documents the store reported as written before a write failed
    pub fn partially_written(&self) -> Option<usize> {
        match self {
            Error::Write { inserted, .. } => Some(*inserted),
            Error::Shared(e) => e.partially_written(),
            _ => None,
        }
    }
}

impl From<Arc<Error>> for Error {
    fn from(value: Arc<Error>) -> Self {
        Error::Shared(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::info;

    #[test_log::test]
    fn test_error_is_fatal_true() {
        let errs = [
            Error::connection("memory://node-0", "refused"),
            Error::query("Profiles", "bad stage"),
            Error::admin("no such index"),
            Error::invalid_config("zero workers"),
            Error::DuplicateRun("indexSort".into()),
            Error::RunNotFound("indexSort".into()),
            Error::WorkerAborted("noUnwinds 1.1".into()),
            Error::Custom("boom".into()),
            Error::Shared(Arc::new(Error::admin("shared"))),
        ];
        for e in &errs {
            info!(?e);
            assert!(e.is_fatal());
        }
    }

    #[test_log::test]
    fn test_error_is_fatal_false() {
        let errs = [
            Error::write("Devices", 0, "duplicate key"),
            Error::Shared(Arc::new(Error::write("Profiles", 12, "shared"))),
        ];
        for e in &errs {
            info!(?e);
            assert!(!e.is_fatal());
        }
    }

    #[test]
    fn test_partially_written() {
        assert_eq!(Some(7), Error::write("Mappings", 7, "x").partially_written());
        assert_eq!(
            Some(3),
            Error::from(Arc::new(Error::write("Mappings", 3, "x"))).partially_written()
        );
        assert_eq!(None, Error::admin("x").partially_written());
    }

    #[test]
    fn test_root() {
        let e = Error::from(Arc::new(Error::from(Arc::new(Error::admin("x")))));
        assert!(matches!(e.root(), Error::Admin(_)));
    }

    #[test]
    fn test_display() {
        let e = Error::write("Devices", 5, "duplicate key");
        assert_eq!("Write error on Devices: duplicate key (5 written)", e.to_string());
    }
}
