//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use gatekeeper_core::error::{AuthzError, Result};
use gatekeeper_core::rbac::{
    MemoryPolicyStore, PolicyRule, PolicyStore, PolicyTables, RoleAssignment, RoleInheritance,
    RoleName, UserId,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// A memory store whose reads and creates can be made to fail or stall.
///
/// Write stalls happen before the write is applied, so a concurrent reader
/// still sees the old state while a writer is stalled.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryPolicyStore,
    fail_reads: AtomicBool,
    fail_creates: AtomicBool,
    read_delay: Mutex<Option<Duration>>,
    edge_listing_delay: Mutex<Option<Duration>>,
    write_delay: Mutex<Option<Duration>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub fn delay_reads(&self, delay: Option<Duration>) {
        *self.read_delay.lock() = delay;
    }

    /// Stall only `list_inheritance`, leaving the other listings fast.
    pub fn delay_edge_listing(&self, delay: Option<Duration>) {
        *self.edge_listing_delay.lock() = delay;
    }

    pub fn delay_writes(&self, delay: Option<Duration>) {
        *self.write_delay.lock() = delay;
    }

    async fn before_read(&self) -> Result<()> {
        stall(&self.read_delay).await;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AuthzError::store_unavailable("connection refused"));
        }
        Ok(())
    }

    async fn before_create(&self) -> Result<()> {
        stall(&self.write_delay).await;
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(AuthzError::store_unavailable("connection reset during insert"));
        }
        Ok(())
    }
}

#[async_trait]
impl PolicyStore for FlakyStore {
    async fn list_policies(&self) -> Result<Vec<PolicyRule>> {
        self.before_read().await?;
        self.inner.list_policies().await
    }

    async fn list_role_assignments(&self) -> Result<Vec<RoleAssignment>> {
        self.before_read().await?;
        self.inner.list_role_assignments().await
    }

    async fn list_inheritance(&self) -> Result<Vec<RoleInheritance>> {
        self.before_read().await?;
        stall(&self.edge_listing_delay).await;
        self.inner.list_inheritance().await
    }

    async fn load_all(&self) -> Result<PolicyTables> {
        self.before_read().await?;
        self.inner.load_all().await
    }

    async fn create_policy(&self, rule: &PolicyRule) -> Result<()> {
        self.before_create().await?;
        self.inner.create_policy(rule).await
    }

    async fn delete_policy(&self, rule: &PolicyRule) -> Result<()> {
        stall(&self.write_delay).await;
        self.inner.delete_policy(rule).await
    }

    async fn create_inheritance(&self, edge: &RoleInheritance) -> Result<()> {
        self.before_create().await?;
        self.inner.create_inheritance(edge).await
    }

    async fn delete_inheritance(&self, edge: &RoleInheritance) -> Result<()> {
        stall(&self.write_delay).await;
        self.inner.delete_inheritance(edge).await
    }

    async fn set_user_role(&self, user_id: &UserId, role: &RoleName) -> Result<()> {
        stall(&self.write_delay).await;
        self.inner.set_user_role(user_id, role).await
    }

    async fn remove_user_roles(&self, user_id: &UserId) -> Result<usize> {
        stall(&self.write_delay).await;
        self.inner.remove_user_roles(user_id).await
    }

    async fn role_of(&self, user_id: &UserId) -> Result<Option<RoleName>> {
        self.inner.role_of(user_id).await
    }
}

async fn stall(delay: &Mutex<Option<Duration>>) {
    let delay = *delay.lock();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}
