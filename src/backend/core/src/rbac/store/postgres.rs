//! PostgreSQL policy store.
//!
//! Tuple uniqueness is enforced by primary keys; a unique violation is
//! reported as the matching duplicate error. Writes are additionally
//! serialized through a process-local lock, and `load_all` reads the three
//! tables inside one repeatable-read transaction.

use async_trait::async_trait;
use sqlx::{
    postgres::{PgExecutor, PgPoolOptions},
    PgPool,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{PolicyStore, PolicyTables};
use crate::config::StoreConfig;
use crate::error::{AuthzError, Result};
use crate::rbac::models::{PolicyRule, RoleAssignment, RoleInheritance, RoleName, UserId};

/// Policy store backed by a PostgreSQL connection pool.
pub struct PgPolicyStore {
    pool: PgPool,
    write_lock: Mutex<()>,
}

impl PgPolicyStore {
    /// Open a connection pool using the store section of the configuration.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let url = config.url.as_deref().ok_or_else(|| {
            AuthzError::Configuration("store.url is required for the postgres backend".into())
        })?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(url)
            .await?;

        info!(
            max_connections = config.max_connections,
            "Connected to policy database"
        );

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
        }
    }

    /// Create the policy tables if they do not exist yet.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl PolicyStore for PgPolicyStore {
    async fn list_policies(&self) -> Result<Vec<PolicyRule>> {
        fetch_rules(&self.pool).await
    }

    async fn list_role_assignments(&self) -> Result<Vec<RoleAssignment>> {
        fetch_assignments(&self.pool).await
    }

    async fn list_inheritance(&self) -> Result<Vec<RoleInheritance>> {
        fetch_edges(&self.pool).await
    }

    async fn load_all(&self) -> Result<PolicyTables> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let rules = fetch_rules(&mut *tx).await?;
        let assignments = fetch_assignments(&mut *tx).await?;
        let edges = fetch_edges(&mut *tx).await?;

        tx.commit().await?;
        Ok(PolicyTables {
            rules,
            assignments,
            edges,
        })
    }

    async fn create_policy(&self, rule: &PolicyRule) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        sqlx::query("INSERT INTO policy_rules (role, resource, action) VALUES ($1, $2, $3)")
            .bind(rule.role.as_str())
            .bind(&rule.resource)
            .bind(rule.action.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AuthzError::DuplicateRule(rule.clone())
                } else {
                    e.into()
                }
            })?;

        debug!(rule = %rule, "Stored policy rule");
        Ok(())
    }

    async fn delete_policy(&self, rule: &PolicyRule) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let result = sqlx::query(
            "DELETE FROM policy_rules WHERE role = $1 AND resource = $2 AND action = $3",
        )
        .bind(rule.role.as_str())
        .bind(&rule.resource)
        .bind(rule.action.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuthzError::not_found("policy rule", rule));
        }
        Ok(())
    }

    async fn create_inheritance(&self, edge: &RoleInheritance) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        sqlx::query("INSERT INTO role_inheritance (role, inherits_from) VALUES ($1, $2)")
            .bind(edge.role.as_str())
            .bind(edge.inherits_from.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AuthzError::DuplicateEdge(edge.clone())
                } else {
                    e.into()
                }
            })?;

        debug!(edge = %edge, "Stored inheritance edge");
        Ok(())
    }

    async fn delete_inheritance(&self, edge: &RoleInheritance) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let result =
            sqlx::query("DELETE FROM role_inheritance WHERE role = $1 AND inherits_from = $2")
                .bind(edge.role.as_str())
                .bind(edge.inherits_from.as_str())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(AuthzError::not_found("inheritance edge", edge));
        }
        Ok(())
    }

    async fn set_user_role(&self, user_id: &UserId, role: &RoleName) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM role_assignments WHERE user_id = $1")
            .bind(user_id.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO role_assignments (user_id, role) VALUES ($1, $2)")
            .bind(user_id.as_str())
            .bind(role.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn remove_user_roles(&self, user_id: &UserId) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        let result = sqlx::query("DELETE FROM role_assignments WHERE user_id = $1")
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() as usize)
    }

    async fn role_of(&self, user_id: &UserId) -> Result<Option<RoleName>> {
        let role: Option<String> =
            sqlx::query_scalar("SELECT role FROM role_assignments WHERE user_id = $1")
                .bind(user_id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        Ok(role.map(RoleName::from))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Queries
// ═══════════════════════════════════════════════════════════════════════════════

async fn fetch_rules<'e, E: PgExecutor<'e>>(executor: E) -> Result<Vec<PolicyRule>> {
    let rows = sqlx::query_as::<_, RuleRow>(
        r#"
        SELECT role, resource, action
        FROM policy_rules
        ORDER BY role, resource, action
        "#,
    )
    .fetch_all(executor)
    .await?;

    rows.into_iter().map(RuleRow::into_rule).collect()
}

async fn fetch_assignments<'e, E: PgExecutor<'e>>(executor: E) -> Result<Vec<RoleAssignment>> {
    let rows = sqlx::query_as::<_, AssignmentRow>(
        "SELECT user_id, role FROM role_assignments ORDER BY user_id",
    )
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| RoleAssignment::new(row.user_id, row.role))
        .collect())
}

async fn fetch_edges<'e, E: PgExecutor<'e>>(executor: E) -> Result<Vec<RoleInheritance>> {
    let rows = sqlx::query_as::<_, EdgeRow>(
        "SELECT role, inherits_from FROM role_inheritance ORDER BY role, inherits_from",
    )
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| RoleInheritance::new(row.role, row.inherits_from))
        .collect())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Row Types
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, sqlx::FromRow)]
struct RuleRow {
    role: String,
    resource: String,
    action: String,
}

impl RuleRow {
    fn into_rule(self) -> Result<PolicyRule> {
        let action = self.action.parse().map_err(|_| {
            AuthzError::store_unavailable(format!(
                "policy_rules contains unknown action '{}'",
                self.action
            ))
        })?;
        Ok(PolicyRule::new(self.role, self.resource, action))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AssignmentRow {
    user_id: String,
    role: String,
}

#[derive(Debug, sqlx::FromRow)]
struct EdgeRow {
    role: String,
    inherits_from: String,
}
