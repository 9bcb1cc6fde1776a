//! apro-persistence
//!
//! Capa de persistencia Postgres (Diesel) del motor de workflows.
//! Objetivo: proveer la implementación durable de `WorkflowStore` /
//! `WorkflowTx` con paridad 1:1 respecto al backend en memoria del core, más
//! utilidades de conexión y migraciones.
//!
//! Módulos:
//! - `pg`: implementación sobre Postgres (entidades + historial append-only).
//! - `migrations`: runner embebido de migraciones Diesel.
//! - `config`: carga de configuración desde .env.
//! - `schema`: tablas Diesel declaradas para compilar queries.

pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema; // generado manualmente

pub use config::init_dotenv;
pub use error::PersistenceError;
pub use pg::{build_dev_pool_from_env, build_pool, ConnectionProvider, PgPool, PgWorkflowStore, PoolProvider};
