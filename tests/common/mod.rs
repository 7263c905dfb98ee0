#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use fundgate::auth::Actor;
use fundgate::entities::project;
use fundgate::escrow::{
    EscrowError, EscrowGateway, EscrowRetryPolicy, ReceiptId, ReleaseInstruction,
};
use fundgate::gate::FundingPolicy;
use fundgate::projects::{NewProject, ReviewAction};
use fundgate::schedule::MilestoneDraft;
use fundgate::{db, FundingService, ServiceSettings};

static INIT: Once = Once::new();

pub fn setup() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt::try_init();
    });
}

/// Records every release and can be switched into a failing mode.
#[derive(Default)]
pub struct MockEscrow {
    pub releases: Mutex<Vec<ReleaseInstruction>>,
    failing: AtomicBool,
}

impl MockEscrow {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn released_amounts(&self) -> Vec<i64> {
        self.releases.lock().unwrap().iter().map(|r| r.amount).collect()
    }

    pub fn call_count(&self) -> usize {
        self.releases.lock().unwrap().len()
    }
}

#[async_trait]
impl EscrowGateway for MockEscrow {
    async fn release(&self, instruction: &ReleaseInstruction) -> Result<ReceiptId, EscrowError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EscrowError::Transient("processor unavailable".to_string()));
        }
        let mut releases = self.releases.lock().unwrap();
        releases.push(instruction.clone());
        Ok(ReceiptId(format!("rcpt-{}", releases.len())))
    }
}

pub struct Fixture {
    pub service: FundingService,
    pub escrow: Arc<MockEscrow>,
    pub artist: Actor,
    pub admin: Actor,
}

pub fn fast_settings(policy: FundingPolicy) -> ServiceSettings {
    ServiceSettings {
        policy,
        escrow_retry: EscrowRetryPolicy {
            attempt_timeout: Duration::from_secs(1),
            max_attempts: 2,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
            deadline: Duration::from_secs(5),
        },
        stale_write_attempts: 5,
    }
}

pub async fn fixture() -> Fixture {
    fixture_with_policy(FundingPolicy::default()).await
}

pub async fn fixture_with_policy(policy: FundingPolicy) -> Fixture {
    setup();
    let db = db::connect("sqlite::memory:").await.unwrap();
    let escrow = Arc::new(MockEscrow::default());
    let service = FundingService::new(db, escrow.clone(), fast_settings(policy));
    Fixture {
        service,
        escrow,
        artist: Actor::artist("artist-1"),
        admin: Actor::admin("admin-1"),
    }
}

pub fn drafts(amounts: &[i64]) -> Vec<MilestoneDraft> {
    amounts
        .iter()
        .enumerate()
        .map(|(i, amount)| MilestoneDraft {
            position: i as i32 + 1,
            name: format!("Milestone {}", i + 1),
            description: String::new(),
            amount: *amount,
        })
        .collect()
}

impl Fixture {
    /// Creates, schedules and activates a project.
    pub async fn active_project(&self, goal: i64, amounts: &[i64]) -> project::Model {
        let project = self
            .service
            .create_project(
                &self.artist,
                NewProject {
                    title: "Debut album".to_string(),
                    funding_goal: goal,
                },
            )
            .await
            .unwrap();
        self.service
            .publish_schedule(project.id, &self.artist, &drafts(amounts))
            .await
            .unwrap();
        self.service
            .review_project(project.id, &self.admin, ReviewAction::Approve)
            .await
            .unwrap()
    }

    pub async fn invest(&self, project: &project::Model, investor: &str, amount: i64) {
        self.service
            .record_investment(project.id, investor, amount)
            .await
            .unwrap();
    }
}
