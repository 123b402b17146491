//! MApp Runtime: everything between a typed request and the spec.
//!
//! The dispatcher pattern-matches CRUD and op routes, the operation
//! runtime wraps Lingo funcs into validated callables, the SQLite adapter
//! implements the abstract storage contract, and the auth service backs
//! the builtin module's ops. One `Ctx` flows through the whole chain.

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod op;
pub mod storage;

pub use auth::AuthService;
pub use config::Config;
pub use dispatch::{Dispatcher, Method, Request, Response, DEFAULT_LIST_LIMIT};
pub use op::{OpRuntime, PreparedOp};
pub use storage::SqliteStorage;

use std::sync::Arc;

use lingo::HostRegistry;
use mapp_core::MappError;
use mapp_spec::Spec;

/// Wire the whole runtime for a normalized spec: in-memory or file-backed
/// storage, standard host registry extended with the auth functions, and
/// a ready dispatcher.
pub fn build_dispatcher(spec: Spec, config: &Config) -> Result<Dispatcher, MappError> {
    let spec = Arc::new(spec);
    let storage = Arc::new(SqliteStorage::open(&config.db_url, &spec)?);
    storage.create_tables()?;

    let auth = Arc::new(AuthService::new(
        &config.auth_secret_key,
        config.login_expiration_minutes,
    ));
    let mut registry = HostRegistry::standard();
    auth.install(&mut registry);

    Dispatcher::new(spec, storage, auth, Arc::new(registry))
}
