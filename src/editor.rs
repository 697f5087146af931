//! Optimistic edit/undo controller.
//!
//! `save` applies a patch locally first, then persists it upstream. Failure
//! rolls the local row back; success arms a 10-second undo window and
//! appends a best-effort audit entry. Undo replays the snapshotted prior
//! state through the same save path, flagged so it doesn't arm a second
//! undo window.
//!
//! Edits to the same row are deliberately not queued or locked: concurrent
//! saves race and last-write-wins, same as concurrent edits from two
//! browser tabs against the remote sheet.

use std::sync::Arc;

use async_trait::async_trait;

use crate::feed::FeedError;
use crate::state::{DashboardState, UndoEntry};
use crate::text::{email_ok, phone_ok};
use crate::types::{Actor, AuditEntry, DelegateRow, PaymentStatus, RowPatch, UpdateFields};

/// How long an undo stays available after a successful save.
pub const UNDO_WINDOW_SECS: u64 = 10;

/// Errors from the edit controller. `Upstream` means the local state has
/// already been rolled back.
#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("{0} is not an editor")]
    NotEditor(String),
    #[error("invalid email: {0}")]
    InvalidEmail(String),
    #[error("invalid phone: {0}")]
    InvalidPhone(String),
    #[error("row {0} not found")]
    RowMissing(u64),
    #[error("nothing to undo for row {0}")]
    NoUndo(u64),
    #[error("save failed, rolled back: {0}")]
    Upstream(#[from] FeedError),
}

/// Persistence seam for the registration backend.
#[async_trait]
pub trait RowStore: Send + Sync {
    async fn push_update(&self, id: u64, fields: &UpdateFields) -> Result<(), FeedError>;
}

/// Append-only audit sink. Writes are best-effort; reads power the history
/// view.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> Result<(), FeedError>;
    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, FeedError>;
}

/// Outcome of a bulk status change: per-row failures don't abort the rest.
#[derive(Debug, Default)]
pub struct BulkOutcome {
    pub applied: Vec<u64>,
    pub failed: Vec<(u64, String)>,
}

pub struct EditController {
    state: Arc<DashboardState>,
    store: Arc<dyn RowStore>,
    audit: Arc<dyn AuditSink>,
    /// Lowercased admin e-mails. Empty means gating is not configured and
    /// edits are open.
    admins: Vec<String>,
}

impl EditController {
    pub fn new(
        state: Arc<DashboardState>,
        store: Arc<dyn RowStore>,
        audit: Arc<dyn AuditSink>,
        admin_emails: &[String],
    ) -> Self {
        EditController {
            state,
            store,
            audit,
            admins: admin_emails.iter().map(|e| e.to_lowercase()).collect(),
        }
    }

    fn authorize(&self, actor: &Actor) -> Result<(), EditError> {
        if self.admins.is_empty() || self.admins.contains(&actor.email.to_lowercase()) {
            Ok(())
        } else {
            Err(EditError::NotEditor(actor.email.clone()))
        }
    }

    fn validate(patch: &RowPatch) -> Result<(), EditError> {
        if let Some(email) = &patch.email {
            if !email.is_empty() && !email_ok(email) {
                return Err(EditError::InvalidEmail(email.clone()));
            }
        }
        for phone in [&patch.phone, &patch.alt_phone].into_iter().flatten() {
            if !phone.is_empty() && !phone_ok(phone) {
                return Err(EditError::InvalidPhone(phone.clone()));
            }
        }
        Ok(())
    }

    /// Save a patch: validate, apply optimistically, persist, arm undo,
    /// audit. On upstream failure the prior row is restored before the
    /// error returns.
    pub async fn save(&self, actor: &Actor, row_id: u64, patch: &RowPatch) -> Result<(), EditError> {
        self.save_inner(actor, row_id, patch, false).await
    }

    async fn save_inner(
        &self,
        actor: &Actor,
        row_id: u64,
        patch: &RowPatch,
        is_undo: bool,
    ) -> Result<(), EditError> {
        self.authorize(actor)?;
        Self::validate(patch)?;

        let prev = self.state.row(row_id).ok_or(EditError::RowMissing(row_id))?;
        let mut next = prev.clone();
        patch.apply_to(&mut next);

        // Optimistic apply
        self.state.put_row(next.clone());

        let fields = UpdateFields::from_row(&next);
        if let Err(e) = self.store.push_update(row_id, &fields).await {
            self.state.put_row(prev);
            log::error!("Edit: save for row {} failed, rolled back: {}", row_id, e);
            return Err(EditError::Upstream(e));
        }

        if !is_undo {
            self.arm_undo(row_id, prev.clone());
        }

        // Best-effort audit: a failed write never unwinds the save.
        if let Some((field, old, new)) = first_change(&prev, &next) {
            let entry = AuditEntry::new(actor, row_id, field, old, new);
            if let Err(e) = self.audit.append(&entry).await {
                log::warn!("Audit: write for row {} dropped: {}", row_id, e);
            }
        }

        log::info!("Edit: row {} saved by {}", row_id, actor.email);
        Ok(())
    }

    fn arm_undo(&self, row_id: u64, prev: DelegateRow) {
        let token = uuid::Uuid::new_v4();
        self.state.push_undo(UndoEntry {
            row_id,
            prev,
            token,
        });
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(UNDO_WINDOW_SECS)).await;
            state.expire_undo(row_id, token);
        });
    }

    /// Replay the snapshotted prior state for a row. Consumes the undo
    /// entry; no new undo window is armed.
    pub async fn undo(&self, actor: &Actor, row_id: u64) -> Result<(), EditError> {
        let entry = self
            .state
            .take_undo(row_id)
            .ok_or(EditError::NoUndo(row_id))?;
        let patch = RowPatch::replay(&entry.prev);
        self.save_inner(actor, row_id, &patch, true).await
    }

    /// Set the status on every selected row, sequentially. Each save is
    /// independent: one failure does not abort the remainder. The selection
    /// is cleared afterwards.
    pub async fn bulk_set_status(
        &self,
        actor: &Actor,
        row_ids: &[u64],
        status: PaymentStatus,
    ) -> BulkOutcome {
        let patch = RowPatch::status(status);
        let mut outcome = BulkOutcome::default();
        for &row_id in row_ids {
            match self.save(actor, row_id, &patch).await {
                Ok(()) => outcome.applied.push(row_id),
                Err(e) => {
                    log::warn!("Edit: bulk status for row {} failed: {}", row_id, e);
                    outcome.failed.push((row_id, e.to_string()));
                }
            }
        }
        self.state.clear_selection();
        outcome
    }
}

/// First visible field that differs between two row states, with old and
/// new values — the granularity of one audit line.
fn first_change(prev: &DelegateRow, next: &DelegateRow) -> Option<(&'static str, String, String)> {
    let fields: [(&'static str, &String, &String); 7] = [
        ("full_name", &prev.full_name, &next.full_name),
        ("email", &prev.email, &next.email),
        ("phone", &prev.phone, &next.phone),
        ("alt_phone", &prev.alt_phone, &next.alt_phone),
        ("committee_pref1", &prev.committee_pref1, &next.committee_pref1),
        ("portfolio_pref1", &prev.portfolio_pref1, &next.portfolio_pref1),
        ("mail_sent", &prev.mail_sent, &next.mail_sent),
    ];
    for (name, old, new) in fields {
        if old != new {
            return Some((name, old.clone(), new.clone()));
        }
    }
    if prev.payment_status != next.payment_status {
        return Some((
            "payment_status",
            prev.payment_status.to_string(),
            next.payment_status.to_string(),
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // -----------------------------------------------------------------------
    // Mocks
    // -----------------------------------------------------------------------

    #[derive(Default)]
    struct MockStore {
        calls: AtomicUsize,
        fail_ids: Vec<u64>,
        last_fields: Mutex<Option<UpdateFields>>,
    }

    #[async_trait]
    impl RowStore for MockStore {
        async fn push_update(&self, id: u64, fields: &UpdateFields) -> Result<(), FeedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_fields.lock() = Some(fields.clone());
            if self.fail_ids.contains(&id) {
                return Err(FeedError::Rejected("row locked".into()));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockAudit {
        entries: Mutex<Vec<AuditEntry>>,
        fail: bool,
    }

    #[async_trait]
    impl AuditSink for MockAudit {
        async fn append(&self, entry: &AuditEntry) -> Result<(), FeedError> {
            if self.fail {
                return Err(FeedError::Transport);
            }
            self.entries.lock().push(entry.clone());
            Ok(())
        }

        async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, FeedError> {
            let mut entries = self.entries.lock().clone();
            entries.reverse();
            entries.truncate(limit);
            Ok(entries)
        }
    }

    fn make_row(id: u64, name: &str) -> DelegateRow {
        let mut row = DelegateRow {
            id,
            full_name: name.to_string(),
            email: format!("d{id}@x.com"),
            phone: "9811588040".to_string(),
            ..Default::default()
        };
        row.recompute_derived();
        row
    }

    #[allow(clippy::type_complexity)]
    fn harness(
        store: MockStore,
        audit: MockAudit,
    ) -> (
        Arc<DashboardState>,
        EditController,
        Arc<MockStore>,
        Arc<MockAudit>,
    ) {
        let state = Arc::new(DashboardState::new(50));
        state.set_rows(
            vec![make_row(1, "Ana Gomez"), make_row(2, "Ben Okafor")],
            vec![],
            json!([]),
        );
        let store = Arc::new(store);
        let audit = Arc::new(audit);
        let controller = EditController::new(
            Arc::clone(&state),
            Arc::clone(&store) as Arc<dyn RowStore>,
            Arc::clone(&audit) as Arc<dyn AuditSink>,
            &["ops@example.com".to_string()],
        );
        (state, controller, store, audit)
    }

    fn ops() -> Actor {
        Actor {
            id: "u1".into(),
            email: "Ops@Example.com".into(),
        }
    }

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_save_applies_patch_and_audits() {
        let (state, ctl, _store, audit) = harness(MockStore::default(), MockAudit::default());

        ctl.save(&ops(), 1, &RowPatch::status(PaymentStatus::Paid))
            .await
            .unwrap();

        let row = state.row(1).unwrap();
        assert_eq!(row.payment_status, PaymentStatus::Paid);
        assert!(row.slab.ends_with("paid"), "derived fields recomputed");
        assert!(state.has_undo(1));

        let history = audit.recent(10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].field, "payment_status");
        assert_eq!(history[0].old_value, "unpaid");
        assert_eq!(history[0].new_value, "paid");
    }

    #[tokio::test]
    async fn test_status_mapped_to_wire_vocabulary() {
        let (_state, ctl, store, _audit) = harness(MockStore::default(), MockAudit::default());

        ctl.save(&ops(), 1, &RowPatch::status(PaymentStatus::Paid))
            .await
            .unwrap();
        let sent = store.last_fields.lock().clone().unwrap();
        assert_eq!(sent.payment_status, "verified");
        // Full patched field set goes out, not just the patch
        assert_eq!(sent.full_name, "Ana Gomez");
        assert_eq!(sent.email, "d1@x.com");

        ctl.save(&ops(), 1, &RowPatch::status(PaymentStatus::Unpaid))
            .await
            .unwrap();
        let sent = store.last_fields.lock().clone().unwrap();
        assert_eq!(sent.payment_status, "pending");
    }

    #[tokio::test]
    async fn test_upstream_failure_rolls_back() {
        let store = MockStore {
            fail_ids: vec![1],
            ..Default::default()
        };
        let (state, ctl, _store, _audit) = harness(store, MockAudit::default());
        let before = state.row(1).unwrap();

        let err = ctl
            .save(&ops(), 1, &RowPatch::status(PaymentStatus::Paid))
            .await
            .unwrap_err();
        assert!(matches!(err, EditError::Upstream(_)));

        assert_eq!(state.row(1).unwrap(), before, "rolled back bit-for-bit");
        assert!(!state.has_undo(1), "no undo window after a failed save");
    }

    #[tokio::test]
    async fn test_validation_rejects_before_any_call() {
        let (state, ctl, store, _audit) = harness(MockStore::default(), MockAudit::default());
        let before = state.row(1).unwrap();

        let bad_email = RowPatch {
            email: Some("not-an-email".into()),
            ..Default::default()
        };
        assert!(matches!(
            ctl.save(&ops(), 1, &bad_email).await.unwrap_err(),
            EditError::InvalidEmail(_)
        ));

        let bad_phone = RowPatch {
            phone: Some("12ab".into()),
            ..Default::default()
        };
        assert!(matches!(
            ctl.save(&ops(), 1, &bad_phone).await.unwrap_err(),
            EditError::InvalidPhone(_)
        ));

        assert_eq!(state.row(1).unwrap(), before, "no state change");
        assert_eq!(store.calls.load(Ordering::SeqCst), 0, "no network call");
    }

    #[tokio::test]
    async fn test_clearing_a_field_is_allowed() {
        let (state, ctl, _store, _audit) = harness(MockStore::default(), MockAudit::default());
        let patch = RowPatch {
            email: Some(String::new()),
            ..Default::default()
        };
        ctl.save(&ops(), 1, &patch).await.unwrap();
        assert_eq!(state.row(1).unwrap().email, "");
    }

    #[tokio::test]
    async fn test_non_editor_refused() {
        let (state, ctl, _store, _audit) = harness(MockStore::default(), MockAudit::default());
        let outsider = Actor {
            id: "u9".into(),
            email: "guest@example.com".into(),
        };
        let err = ctl
            .save(&outsider, 1, &RowPatch::status(PaymentStatus::Paid))
            .await
            .unwrap_err();
        assert!(matches!(err, EditError::NotEditor(_)));
        assert_eq!(state.row(1).unwrap().payment_status, PaymentStatus::Unpaid);
    }

    #[tokio::test]
    async fn test_undo_restores_exact_prior_state() {
        let (state, ctl, _store, _audit) = harness(MockStore::default(), MockAudit::default());
        let before = state.row(1).unwrap();

        ctl.save(&ops(), 1, &RowPatch::status(PaymentStatus::Paid))
            .await
            .unwrap();
        assert_ne!(state.row(1).unwrap(), before);

        ctl.undo(&ops(), 1).await.unwrap();
        assert_eq!(
            state.row(1).unwrap(),
            before,
            "full field set including derived fields"
        );
        // Undo consumed the entry and armed no new window
        assert!(!state.has_undo(1));
        assert!(matches!(
            ctl.undo(&ops(), 1).await.unwrap_err(),
            EditError::NoUndo(1)
        ));
    }

    #[tokio::test]
    async fn test_second_save_supersedes_undo_window() {
        let (state, ctl, _store, _audit) = harness(MockStore::default(), MockAudit::default());

        ctl.save(&ops(), 1, &RowPatch::status(PaymentStatus::Paid))
            .await
            .unwrap();
        ctl.save(&ops(), 1, &RowPatch::status(PaymentStatus::Rejected))
            .await
            .unwrap();

        // Undo rewinds only the latest save
        ctl.undo(&ops(), 1).await.unwrap();
        assert_eq!(state.row(1).unwrap().payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_audit_failure_never_unwinds_save() {
        let audit = MockAudit {
            fail: true,
            ..Default::default()
        };
        let (state, ctl, _store, _audit) = harness(MockStore::default(), audit);

        ctl.save(&ops(), 1, &RowPatch::status(PaymentStatus::Paid))
            .await
            .unwrap();
        assert_eq!(state.row(1).unwrap().payment_status, PaymentStatus::Paid);
        assert!(state.has_undo(1));
    }

    #[tokio::test]
    async fn test_bulk_continues_past_failures() {
        let store = MockStore {
            fail_ids: vec![1],
            ..Default::default()
        };
        let (state, ctl, _store, _audit) = harness(store, MockAudit::default());
        state.select(1);
        state.select(2);

        let ids = state.selected();
        let outcome = ctl.bulk_set_status(&ops(), &ids, PaymentStatus::Paid).await;

        assert_eq!(outcome.applied, vec![2]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, 1);
        assert_eq!(state.row(2).unwrap().payment_status, PaymentStatus::Paid);
        assert_eq!(state.row(1).unwrap().payment_status, PaymentStatus::Unpaid);
        assert!(state.selected().is_empty(), "selection cleared");
    }

    #[tokio::test]
    async fn test_same_row_concurrent_saves_last_write_wins() {
        let (state, ctl, _store, _audit) = harness(MockStore::default(), MockAudit::default());

        // No per-row lock: both saves succeed and the later one's patch is
        // what local state reflects.
        ctl.save(&ops(), 1, &RowPatch::status(PaymentStatus::Paid))
            .await
            .unwrap();
        ctl.save(&ops(), 1, &RowPatch::status(PaymentStatus::Rejected))
            .await
            .unwrap();
        assert_eq!(
            state.row(1).unwrap().payment_status,
            PaymentStatus::Rejected
        );
    }

    #[tokio::test]
    async fn test_missing_row() {
        let (_state, ctl, _store, _audit) = harness(MockStore::default(), MockAudit::default());
        assert!(matches!(
            ctl.save(&ops(), 99, &RowPatch::status(PaymentStatus::Paid))
                .await
                .unwrap_err(),
            EditError::RowMissing(99)
        ));
    }
}
