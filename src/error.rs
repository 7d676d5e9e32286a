//! Error types for the deployment engine
//!
//! One variant-rich enum per component plus a top-level `DeployError` that
//! nests them, matching the error kinds in the error handling design: a
//! `ConfigurationError` and `EndpointError` are fatal before any work
//! starts, a `TransferError` is recorded per-path and the run continues,
//! `SqlError` aborts the containing phase, `SeedError` aborts one spec, and
//! `CacheError` on read is swallowed into "no cache" while on write it is
//! logged but does not fail an already-successful run.

use std::error::Error;
use std::fmt;
use std::io;

/// Helper to reduce `Box::new()` boilerplate when wrapping errors.
#[inline]
pub fn boxed_error<E: Error + Send + Sync + 'static>(e: E) -> Box<dyn Error + Send + Sync> {
	Box::new(e)
}

/// Missing/invalid configuration document. Fatal at startup.
#[derive(Debug)]
pub enum ConfigurationError {
	MissingField { field: String },
	InvalidValue { field: String, message: String },
	MutuallyExclusive { a: String, b: String },
	UnreadableFile { path: String, source: io::Error },
	WrongAgent { found: String },
}

impl fmt::Display for ConfigurationError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConfigurationError::MissingField { field } => {
				write!(f, "missing required configuration field: {}", field)
			}
			ConfigurationError::InvalidValue { field, message } => {
				write!(f, "invalid value for {}: {}", field, message)
			}
			ConfigurationError::MutuallyExclusive { a, b } => {
				write!(f, "{} and {} cannot both be set", a, b)
			}
			ConfigurationError::UnreadableFile { path, source } => {
				write!(f, "cannot read configuration file {}: {}", path, source)
			}
			ConfigurationError::WrongAgent { found } => {
				write!(f, "unrecognized agent_name: {} (expected \"ai-deploy\")", found)
			}
		}
	}
}

impl Error for ConfigurationError {}

/// Endpoint-level failures: authentication, DNS/TCP, SFTP subsystem.
/// Fatal: the run aborts before any destructive action.
#[derive(Debug)]
pub enum EndpointError {
	AuthenticationFailed { endpoint: String, message: String },
	ConnectFailed { endpoint: String, source: Box<dyn Error + Send + Sync> },
	SftpSubsystemFailed { endpoint: String, message: String },
	Io(io::Error),
}

impl fmt::Display for EndpointError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			EndpointError::AuthenticationFailed { endpoint, message } => {
				write!(f, "authentication failed for {}: {}", endpoint, message)
			}
			EndpointError::ConnectFailed { endpoint, source } => {
				write!(f, "failed to connect to {}: {}", endpoint, source)
			}
			EndpointError::SftpSubsystemFailed { endpoint, message } => {
				write!(f, "SFTP subsystem failure on {}: {}", endpoint, message)
			}
			EndpointError::Io(e) => write!(f, "I/O error: {}", e),
		}
	}
}

impl Error for EndpointError {}

impl From<io::Error> for EndpointError {
	fn from(e: io::Error) -> Self {
		EndpointError::Io(e)
	}
}

/// Failure transferring, deleting, or stat-ing a single file. Recorded
/// against that path; the run continues with other files in the plan.
#[derive(Debug)]
pub struct TransferError {
	pub path: String,
	pub message: String,
}

impl fmt::Display for TransferError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "transfer failed for {}: {}", self.path, self.message)
	}
}

impl Error for TransferError {}

/// A statement rejected by the database server. Fatal to the containing
/// file and phase; subsequent phases are skipped.
#[derive(Debug)]
pub enum SqlError {
	ConnectFailed { message: String },
	StatementFailed { file: String, statement: String, message: String },
	TunnelFailed { message: String },
}

impl fmt::Display for SqlError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SqlError::ConnectFailed { message } => write!(f, "database connection failed: {}", message),
			SqlError::StatementFailed { file, statement, message } => write!(
				f,
				"statement failed in {} ({}...): {}",
				file,
				&statement.chars().take(60).collect::<String>(),
				message
			),
			SqlError::TunnelFailed { message } => write!(f, "SSH tunnel to database failed: {}", message),
		}
	}
}

impl Error for SqlError {}

/// JSON parse error, missing required field with no default, mis-shaped
/// nested array, or a SQL failure while inserting seed rows. Fatal to that
/// spec; subsequent specs still run.
#[derive(Debug)]
pub enum SeedError {
	JsonParse { file: String, message: String },
	MissingField { spec: String, field: String },
	MisshapedArray { spec: String, field: String },
	Sql(SqlError),
}

impl fmt::Display for SeedError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SeedError::JsonParse { file, message } => write!(f, "failed to parse {}: {}", file, message),
			SeedError::MissingField { spec, field } => {
				write!(f, "seed spec {} has no binding or default for field {}", spec, field)
			}
			SeedError::MisshapedArray { spec, field } => {
				write!(f, "seed spec {} expected an array at field {}", spec, field)
			}
			SeedError::Sql(e) => write!(f, "{}", e),
		}
	}
}

impl Error for SeedError {}

impl From<SqlError> for SeedError {
	fn from(e: SqlError) -> Self {
		SeedError::Sql(e)
	}
}

/// Cache read failure at startup is non-fatal (falls back to full
/// comparison); cache write failure at end is non-fatal to an already
/// successful deploy but is logged loudly.
#[derive(Debug)]
pub enum CacheError {
	ReadFailed { path: String, message: String },
	WriteFailed { path: String, message: String },
}

impl fmt::Display for CacheError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CacheError::ReadFailed { path, message } => write!(f, "cannot read cache {}: {}", path, message),
			CacheError::WriteFailed { path, message } => write!(f, "cannot write cache {}: {}", path, message),
		}
	}
}

impl Error for CacheError {}

/// Top-level error the orchestrator surfaces to `main`.
#[derive(Debug)]
pub enum DeployError {
	Configuration(ConfigurationError),
	Endpoint(EndpointError),
	Sql(SqlError),
	TransferErrors(Vec<TransferError>),
	Other { message: String },
}

impl fmt::Display for DeployError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			DeployError::Configuration(e) => write!(f, "configuration error: {}", e),
			DeployError::Endpoint(e) => write!(f, "endpoint error: {}", e),
			DeployError::Sql(e) => write!(f, "SQL error: {}", e),
			DeployError::TransferErrors(errs) => {
				write!(f, "{} file(s) failed to transfer:", errs.len())?;
				for e in errs {
					write!(f, "\n  - {}", e)?;
				}
				Ok(())
			}
			DeployError::Other { message } => write!(f, "{}", message),
		}
	}
}

impl Error for DeployError {}

impl From<ConfigurationError> for DeployError {
	fn from(e: ConfigurationError) -> Self {
		DeployError::Configuration(e)
	}
}

impl From<EndpointError> for DeployError {
	fn from(e: EndpointError) -> Self {
		DeployError::Endpoint(e)
	}
}

impl From<SqlError> for DeployError {
	fn from(e: SqlError) -> Self {
		DeployError::Sql(e)
	}
}

impl From<io::Error> for DeployError {
	fn from(e: io::Error) -> Self {
		DeployError::Other { message: e.to_string() }
	}
}

// vim: ts=4
