//! Shared fixtures for business integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use fanledger_business::{
    AccountingClient, AccountingPayload, ConfigLoader, ExportError, LedgerConfig, ServiceContext,
};
use fanledger_persistence::{CollaboratorRepo, Database};
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const AGENCY: &str = "agency_a";
pub const MANAGED_CREATOR: &str = "creator_managed";
pub const SOLO_CREATOR: &str = "creator_solo";
pub const CHATTER: &str = "chatter_c";
pub const PERSONA: &str = "persona_p";

/// In-memory database with an empty ledger and no accounting endpoint
pub async fn context() -> ServiceContext {
    context_with(LedgerConfig::default()).await
}

pub async fn context_with(config: LedgerConfig) -> ServiceContext {
    let db = Database::in_memory().await.unwrap();
    ServiceContext::new(&db, config).unwrap()
}

pub async fn context_from_toml(toml: &str) -> ServiceContext {
    context_with(ConfigLoader::load_str(toml).unwrap()).await
}

/// agency_a (30%) manages creator_managed; chatter_c (20%) and persona_p
/// (10%) work for agency_a; creator_solo has no agency.
pub async fn seed_collaborators(ctx: &ServiceContext) {
    let pool = ctx.pool();
    CollaboratorRepo::upsert_agency(pool, AGENCY, "Agency A", dec!(0.30)).await.unwrap();
    CollaboratorRepo::upsert_agency(pool, "agency_b", "Agency B", dec!(0.25)).await.unwrap();
    CollaboratorRepo::upsert_creator(pool, MANAGED_CREATOR, "managed", Some(AGENCY)).await.unwrap();
    CollaboratorRepo::upsert_creator(pool, SOLO_CREATOR, "solo", None).await.unwrap();
    CollaboratorRepo::upsert_chatter(pool, CHATTER, AGENCY, dec!(0.20)).await.unwrap();
    CollaboratorRepo::upsert_chatter(pool, "chatter_b", "agency_b", dec!(0.50)).await.unwrap();
    CollaboratorRepo::upsert_ai_personality(pool, PERSONA, AGENCY, dec!(0.10)).await.unwrap();
}

/// Accounting client whose outcome the test controls
#[derive(Default)]
pub struct ScriptedClient {
    fail: AtomicBool,
    calls: AtomicUsize,
    received: Mutex<Vec<AccountingPayload>>,
}

impl ScriptedClient {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let client = Self::default();
        client.fail.store(true, Ordering::SeqCst);
        Arc::new(client)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<AccountingPayload> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl AccountingClient for ScriptedClient {
    async fn submit(&self, payload: &AccountingPayload) -> Result<(), ExportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.received.lock().unwrap().push(payload.clone());
        if self.fail.load(Ordering::SeqCst) {
            Err(ExportError::Status(503))
        } else {
            Ok(())
        }
    }
}
