//! Implementación Postgres (Diesel) de los traits de almacenamiento del core.
//!
//! Objetivo general del módulo:
//! - Proveer una capa de persistencia durable (Postgres) con paridad 1:1
//!   respecto al backend en memoria del core.
//! - Cada operación del motor corre dentro de UNA transacción Diesel
//!   (`build_transaction().read_write()`): si el cierre devuelve error, todo
//!   se revierte (steps, historial, instancia).
//! - Aislar completamente el mapeo dominio ↔ filas de DB del `apro-core`.
//!
//! Concurrencia: `get_instance` toma `FOR UPDATE` sobre la fila de la
//! instancia. Dos `execute_step` concurrentes sobre ramas paralelas de la
//! misma instancia se serializan en ese lock, eliminando el lost-update sobre
//! `active_steps`/`form_data` señalado en el diseño original.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use serde_json::Value;
use uuid::Uuid;

use apro_core::errors::EngineError;
use apro_core::model::{HistoryAction, HistoryEntry, InstanceStatus, NewHistoryEntry, StepStatus, WorkflowInstance, WorkflowStepInstance, WorkflowTemplate};
use apro_core::store::{WorkflowStore, WorkflowTx};
use log::{debug, warn};

use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;
use crate::schema::{workflow_history, workflow_instances, workflow_step_instances, workflow_templates};

/// Alias de tipo para el pool r2d2 de conexiones Postgres.
///
/// Notas operativas:
/// - El pool se construye con `min_idle` (mínimo de conexiones inactivas) y
///   `max_size` (límite superior total).
/// - Al construirlo, se corre automáticamente el set de migraciones pendientes
///   (una sola vez).
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones.
///
/// Permite inyectar un pool real (producción/tests de integración) o
/// simular/factorear en tests unitarios sin acoplar a r2d2.
///
/// Contrato: debe devolver una conexión válida o
/// `PersistenceError::TransientIo`/equivalente en caso de error.
pub trait ConnectionProvider: Send + Sync + 'static {
    /// Obtiene una conexión lista para ejecutar consultas Diesel.
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError>;
}

/// Implementación concreta de `ConnectionProvider` respaldada por un `PgPool`.
pub struct PoolProvider {
    pub pool: PgPool,
}
impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>, PersistenceError> {
        self.pool
            .get()
            .map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

/// Retry simple con backoff exponencial muy pequeño (hasta 3 intentos).
/// No altera semántica de negocio; sólo repite la unidad de trabajo provista.
fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if e.is_transient() && attempts < 3 => {
                let delay_ms = 15 * ((attempts + 1) as u64);
                warn!("retryable error (attempt {}): {:?} -> sleeping {}ms",
                      attempts + 1,
                      e,
                      delay_ms);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

fn db_err(e: diesel::result::Error) -> EngineError {
    match PersistenceError::from(e) {
        PersistenceError::NotFound => EngineError::NotFound,
        other => EngineError::Storage(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Filas
// ---------------------------------------------------------------------------

#[derive(Queryable, Debug)]
pub struct TemplateRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub definition: Value,
    pub version: i32,
    pub is_active: bool,
    pub is_current: bool,
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = workflow_templates)]
struct NewTemplateRow<'a> {
    id: &'a Uuid,
    organization_id: &'a Uuid,
    name: &'a str,
    definition: &'a Value,
    version: i32,
    is_active: bool,
    is_current: bool,
    parent_id: Option<&'a Uuid>,
    created_at: DateTime<Utc>,
}

#[derive(Queryable, Debug)]
pub struct InstanceRow {
    pub id: Uuid,
    pub template_id: Uuid,
    pub organization_id: Uuid,
    pub title: String,
    pub form_data: Value,
    pub status: String,
    pub active_steps: Value,
    pub parallel_mode: bool,
    pub started_by: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = workflow_instances)]
struct NewInstanceRow<'a> {
    id: &'a Uuid,
    template_id: &'a Uuid,
    organization_id: &'a Uuid,
    title: &'a str,
    form_data: &'a Value,
    status: &'a str,
    active_steps: &'a Value,
    parallel_mode: bool,
    started_by: &'a str,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

#[derive(Queryable, Debug)]
pub struct StepRow {
    pub instance_id: Uuid,
    pub step_id: i64,
    pub step_key: String,
    pub status: String,
    pub assigned_to: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub comments: Option<String>,
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = workflow_step_instances)]
struct NewStepRow<'a> {
    instance_id: &'a Uuid,
    step_id: i64,
    step_key: &'a str,
    status: &'a str,
    assigned_to: Option<&'a str>,
    assigned_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    comments: Option<&'a str>,
    data: &'a Value,
    created_at: DateTime<Utc>,
}

#[derive(Queryable, Debug)]
pub struct HistoryRow {
    pub seq: i64,
    pub instance_id: Uuid,
    pub action: String,
    pub performed_by: String,
    pub performed_at: DateTime<Utc>,
    pub data: Value,
    pub comments: Option<String>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = workflow_history)]
struct NewHistoryRow<'a> {
    instance_id: &'a Uuid,
    action: &'a str,
    performed_by: &'a str,
    data: &'a Value,
    comments: Option<&'a str>,
}

// ---------------------------------------------------------------------------
// Mapeo filas ↔ dominio
// ---------------------------------------------------------------------------

fn template_from_row(row: TemplateRow) -> WorkflowTemplate {
    WorkflowTemplate { id: row.id,
                       organization_id: row.organization_id,
                       name: row.name,
                       definition: row.definition,
                       version: row.version,
                       is_active: row.is_active,
                       is_current: row.is_current,
                       parent_id: row.parent_id,
                       created_at: row.created_at }
}

fn instance_from_row(row: InstanceRow) -> Result<WorkflowInstance, EngineError> {
    let status = InstanceStatus::parse(&row.status)
        .ok_or_else(|| EngineError::Storage(format!("unknown instance status '{}'", row.status)))?;
    let active: Vec<i64> = serde_json::from_value(row.active_steps)
        .map_err(|e| EngineError::Storage(format!("corrupt active_steps: {e}")))?;
    Ok(WorkflowInstance { id: row.id,
                          template_id: row.template_id,
                          organization_id: row.organization_id,
                          title: row.title,
                          form_data: row.form_data,
                          status,
                          active_steps: active.into_iter().collect(),
                          parallel_mode: row.parallel_mode,
                          started_by: row.started_by,
                          started_at: row.started_at,
                          completed_at: row.completed_at })
}

fn step_from_row(row: StepRow) -> Result<WorkflowStepInstance, EngineError> {
    let status = StepStatus::parse(&row.status)
        .ok_or_else(|| EngineError::Storage(format!("unknown step status '{}'", row.status)))?;
    Ok(WorkflowStepInstance { instance_id: row.instance_id,
                              step_id: row.step_id,
                              step_key: row.step_key,
                              status,
                              assigned_to: row.assigned_to,
                              assigned_at: row.assigned_at,
                              completed_at: row.completed_at,
                              comments: row.comments,
                              data: row.data,
                              created_at: row.created_at })
}

/// Deserializa una fila de historial. Acciones desconocidas (esquema más
/// nuevo que el binario) se descartan con un warn en lugar de fallar.
fn history_from_row(row: HistoryRow) -> Option<HistoryEntry> {
    let action = match HistoryAction::parse(&row.action) {
        Some(a) => a,
        None => {
            warn!("skipping history row seq={} with unknown action '{}'", row.seq, row.action);
            return None;
        }
    };
    Some(HistoryEntry { seq: row.seq,
                        instance_id: row.instance_id,
                        action,
                        performed_by: row.performed_by,
                        performed_at: row.performed_at,
                        data: row.data,
                        comments: row.comments })
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Implementación Postgres de `WorkflowStore`.
pub struct PgWorkflowStore<P: ConnectionProvider> {
    pub provider: P,
}

impl<P: ConnectionProvider> PgWorkflowStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

// Puente de errores para `build_transaction().run()`: Diesel exige
// `E: From<diesel::result::Error>` y `EngineError` vive en el core (regla de
// huérfanos), así que envolvemos.
enum TxError {
    Engine(EngineError),
    Diesel(diesel::result::Error),
}

impl From<diesel::result::Error> for TxError {
    fn from(e: diesel::result::Error) -> Self {
        Self::Diesel(e)
    }
}

impl<P: ConnectionProvider> WorkflowStore for PgWorkflowStore<P> {
    fn transaction<T, F>(&mut self, f: F) -> Result<T, EngineError>
        where F: FnOnce(&mut dyn WorkflowTx) -> Result<T, EngineError>
    {
        // Adquisición de conexión con retry ante fallos transitorios del pool.
        let mut conn = with_retry(|| self.provider.connection())
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        debug!("pg transaction:start");
        let result = conn.build_transaction()
                         .read_write()
                         .run(|tx_conn| {
                             let mut tx = PgTx { conn: tx_conn };
                             f(&mut tx).map_err(TxError::Engine)
                         });
        debug!("pg transaction:done ok={}", result.is_ok());

        result.map_err(|e| match e {
                  TxError::Engine(e) => e,
                  TxError::Diesel(e) => EngineError::Storage(PersistenceError::from(e).to_string()),
              })
    }
}

struct PgTx<'a> {
    conn: &'a mut PgConnection,
}

impl WorkflowTx for PgTx<'_> {
    fn insert_template(&mut self, template: &WorkflowTemplate) -> Result<(), EngineError> {
        let row = NewTemplateRow { id: &template.id,
                                   organization_id: &template.organization_id,
                                   name: &template.name,
                                   definition: &template.definition,
                                   version: template.version,
                                   is_active: template.is_active,
                                   is_current: template.is_current,
                                   parent_id: template.parent_id.as_ref(),
                                   created_at: template.created_at };
        // Upsert por id: paridad con el backend en memoria (sembrar dos veces
        // la misma plantilla reemplaza, no falla).
        diesel::insert_into(workflow_templates::table)
            .values(&row)
            .on_conflict(workflow_templates::id)
            .do_update()
            .set((workflow_templates::name.eq(&template.name),
                  workflow_templates::definition.eq(&template.definition),
                  workflow_templates::version.eq(template.version),
                  workflow_templates::is_active.eq(template.is_active),
                  workflow_templates::is_current.eq(template.is_current)))
            .execute(self.conn)
            .map_err(db_err)?;
        Ok(())
    }

    fn get_template(&mut self, id: Uuid) -> Result<WorkflowTemplate, EngineError> {
        let row: TemplateRow = workflow_templates::table.find(id)
                                                        .first(self.conn)
                                                        .map_err(db_err)?;
        Ok(template_from_row(row))
    }

    fn insert_instance(&mut self, instance: &WorkflowInstance) -> Result<(), EngineError> {
        let active_steps = serde_json::to_value(&instance.active_steps)
            .map_err(|e| EngineError::Storage(format!("serialize active_steps: {e}")))?;
        let row = NewInstanceRow { id: &instance.id,
                                   template_id: &instance.template_id,
                                   organization_id: &instance.organization_id,
                                   title: &instance.title,
                                   form_data: &instance.form_data,
                                   status: instance.status.as_str(),
                                   active_steps: &active_steps,
                                   parallel_mode: instance.parallel_mode,
                                   started_by: &instance.started_by,
                                   started_at: instance.started_at,
                                   completed_at: instance.completed_at };
        diesel::insert_into(workflow_instances::table)
            .values(&row)
            .execute(self.conn)
            .map_err(db_err)?;
        Ok(())
    }

    fn get_instance(&mut self, id: Uuid) -> Result<WorkflowInstance, EngineError> {
        // Lock pesimista: serializa ejecuciones concurrentes sobre la misma
        // instancia dentro de la transacción en curso.
        let row: InstanceRow = workflow_instances::table.find(id)
                                                        .for_update()
                                                        .first(self.conn)
                                                        .map_err(db_err)?;
        instance_from_row(row)
    }

    fn update_instance(&mut self, instance: &WorkflowInstance) -> Result<(), EngineError> {
        let active_steps = serde_json::to_value(&instance.active_steps)
            .map_err(|e| EngineError::Storage(format!("serialize active_steps: {e}")))?;
        let n = diesel::update(workflow_instances::table.find(instance.id))
            .set((workflow_instances::title.eq(&instance.title),
                  workflow_instances::form_data.eq(&instance.form_data),
                  workflow_instances::status.eq(instance.status.as_str()),
                  workflow_instances::active_steps.eq(&active_steps),
                  workflow_instances::parallel_mode.eq(instance.parallel_mode),
                  workflow_instances::completed_at.eq(instance.completed_at)))
            .execute(self.conn)
            .map_err(db_err)?;
        if n == 0 {
            return Err(EngineError::NotFound);
        }
        Ok(())
    }

    fn insert_step(&mut self, step: &WorkflowStepInstance) -> Result<(), EngineError> {
        let row = NewStepRow { instance_id: &step.instance_id,
                               step_id: step.step_id,
                               step_key: &step.step_key,
                               status: step.status.as_str(),
                               assigned_to: step.assigned_to.as_deref(),
                               assigned_at: step.assigned_at,
                               completed_at: step.completed_at,
                               comments: step.comments.as_deref(),
                               data: &step.data,
                               created_at: step.created_at };
        diesel::insert_into(workflow_step_instances::table)
            .values(&row)
            .execute(self.conn)
            .map_err(db_err)?;
        Ok(())
    }

    fn get_step(&mut self, instance_id: Uuid, step_id: i64) -> Result<WorkflowStepInstance, EngineError> {
        let row: StepRow = workflow_step_instances::table.find((instance_id, step_id))
                                                         .first(self.conn)
                                                         .map_err(db_err)?;
        step_from_row(row)
    }

    fn update_step(&mut self, step: &WorkflowStepInstance) -> Result<(), EngineError> {
        let n = diesel::update(workflow_step_instances::table.find((step.instance_id, step.step_id)))
            .set((workflow_step_instances::status.eq(step.status.as_str()),
                  workflow_step_instances::assigned_to.eq(step.assigned_to.as_deref()),
                  workflow_step_instances::assigned_at.eq(step.assigned_at),
                  workflow_step_instances::completed_at.eq(step.completed_at),
                  workflow_step_instances::comments.eq(step.comments.as_deref()),
                  workflow_step_instances::data.eq(&step.data)))
            .execute(self.conn)
            .map_err(db_err)?;
        if n == 0 {
            return Err(EngineError::NotFound);
        }
        Ok(())
    }

    fn max_step_id(&mut self, instance_id: Uuid) -> Result<i64, EngineError> {
        let max: Option<i64> = workflow_step_instances::table
            .filter(workflow_step_instances::instance_id.eq(instance_id))
            .select(diesel::dsl::max(workflow_step_instances::step_id))
            .first(self.conn)
            .map_err(db_err)?;
        Ok(max.unwrap_or(0))
    }

    fn steps_for_instance(&mut self, instance_id: Uuid) -> Result<Vec<WorkflowStepInstance>, EngineError> {
        let rows: Vec<StepRow> = workflow_step_instances::table
            .filter(workflow_step_instances::instance_id.eq(instance_id))
            .order(workflow_step_instances::step_id.asc())
            .load(self.conn)
            .map_err(db_err)?;
        rows.into_iter().map(step_from_row).collect()
    }

    fn append_history(&mut self, entry: NewHistoryEntry) -> Result<HistoryEntry, EngineError> {
        let row = NewHistoryRow { instance_id: &entry.instance_id,
                                  action: entry.action.as_str(),
                                  performed_by: &entry.performed_by,
                                  data: &entry.data,
                                  comments: entry.comments.as_deref() };
        let (seq, performed_at): (i64, DateTime<Utc>) = diesel::insert_into(workflow_history::table)
            .values(&row)
            .returning((workflow_history::seq, workflow_history::performed_at))
            .get_result(self.conn)
            .map_err(db_err)?;
        Ok(HistoryEntry { seq,
                          instance_id: entry.instance_id,
                          action: entry.action,
                          performed_by: entry.performed_by,
                          performed_at,
                          data: entry.data,
                          comments: entry.comments })
    }

    fn history_for_instance(&mut self, instance_id: Uuid) -> Result<Vec<HistoryEntry>, EngineError> {
        let rows: Vec<HistoryRow> = workflow_history::table
            .filter(workflow_history::instance_id.eq(instance_id))
            .order(workflow_history::seq.asc())
            .load(self.conn)
            .map_err(db_err)?;
        Ok(rows.into_iter().filter_map(history_from_row).collect())
    }
}

// ---------------------------------------------------------------------------
// Construcción de pools
// ---------------------------------------------------------------------------

/// Construye un pool Postgres r2d2 a partir de URL.
///
/// Comportamiento:
/// - Valida y ajusta tamaños (si `min_size > max_size`, usa `min_size =
///   max_size`).
/// - Ejecuta migraciones inmediatamente tras el primer `get()`.
/// - Devuelve `PersistenceError::TransientIo` ante errores del pool/manager.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let validated_min = if min_size == 0 { 1 } else { min_size };
    let validated_max = if max_size == 0 { 1 } else { max_size };
    if validated_min > validated_max {
        warn!("min_size > max_size ({} > {}), ajustando min=max", validated_min, validated_max);
    }
    let final_min = validated_min.min(validated_max);
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(final_min))
                                    .max_size(validated_max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    // Ejecutar migraciones una sola vez al construir (primer connection checkout).
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

/// Helper de desarrollo: carga `.env`, lee configuración (DATABASE_URL,
/// tamaños) y construye un pool ya migrado.
pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    crate::config::init_dotenv();
    let cfg = crate::config::DbConfig::from_env();
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}
