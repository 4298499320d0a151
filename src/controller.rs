// ===============================
// src/controller.rs
// ===============================
//
// The form controller owns input state, error state and the submission
// lifecycle: Editing -> (valid submit) -> Submitted -> (revert timer) ->
// Editing with a cleared form. State changes are published as FormSnapshot
// over a watch channel; audit events go to the recorder channel.
//
// The revert timer lives inside the controller task, so tearing the task
// down (UI channel closed) cancels it with everything else.
//
use ahash::AHashMap as HashMap;
use chrono::{SecondsFormat, Utc};
use tokio::{
    sync::{mpsc, watch},
    time::{sleep_until, Duration, Instant},
};
use tracing::{debug, info, warn};

use crate::domain::{
    AuditEvent, Bounds, Fund, FormEvent, FormInput, FormSnapshot, Investment, OptionsPayload,
    Phase, ValidationResult,
};
use crate::history::HistoryStore;
use crate::metrics::{
    HISTORY_RECORDS, INPUT_REJECTS, REVERTS, STORE_FAILURES, SUBMISSIONS, VALIDATION_FAILURES,
};
use crate::provider;
use crate::validate;

/// Placeholder name for a selected id missing from the loaded fund list.
/// Substituted rather than rejected; never blocks a submission.
pub const UNKNOWN_FUND_NAME: &str = "Unknown";

pub const MSG_STORE_FAILED: &str = "Could not save your investment, please try again";

#[derive(Debug, PartialEq)]
pub enum SubmitOutcome {
    /// Form disabled (options pending) or already submitted.
    Ignored,
    Invalid,
    Accepted(Investment),
    StoreFailed,
}

pub struct FormController<S: HistoryStore> {
    input: FormInput,
    errors: ValidationResult,
    phase: Phase,
    bounds: Bounds,
    defaults: Bounds,
    funds: Vec<Fund>,
    fund_index: HashMap<String, Fund>,
    options_loaded: bool,
    notice: Option<String>,
    history: Vec<Investment>,
    store: S,
    max_selectable: usize,
    revert_after: Duration,
}

impl<S: HistoryStore> FormController<S> {
    pub fn new(store: S, defaults: Bounds, max_selectable: usize, revert_after: Duration) -> Self {
        let history = store.load();
        HISTORY_RECORDS.set(history.len() as i64);
        FormController {
            input: FormInput::default(),
            errors: ValidationResult::default(),
            phase: Phase::Editing,
            bounds: defaults,
            defaults,
            funds: Vec::new(),
            fund_index: HashMap::new(),
            options_loaded: false,
            notice: None,
            history,
            store,
            max_selectable: max_selectable.max(1),
            revert_after,
        }
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn revert_after(&self) -> Duration {
        self.revert_after
    }

    /// Options arrived: funds become selectable and the amount range follows
    /// the payload. Already-entered input is NOT re-validated here; the next
    /// submit attempt picks the new bounds up.
    pub fn set_options(&mut self, payload: OptionsPayload) {
        self.bounds = provider::sanitize_bounds(
            payload.min_investment,
            payload.max_investment,
            self.defaults,
        );
        self.fund_index = payload
            .available_funds
            .iter()
            .map(|f| (f.id.clone(), f.clone()))
            .collect();
        self.funds = payload.available_funds;
        self.options_loaded = true;
        info!(funds = self.funds.len(), min = self.bounds.min, max = self.bounds.max,
            "options loaded, form enabled");
    }

    /// Field edits. Returns the audit event to record, if any.
    pub fn on_event(&mut self, ev: FormEvent) -> Option<AuditEvent> {
        if self.phase == Phase::Submitted {
            // form hidden while the success message shows
            debug!(?ev, "ignoring input while submitted");
            return None;
        }
        if !self.options_loaded {
            debug!(?ev, "ignoring input until options load");
            return None;
        }
        match ev {
            FormEvent::SelectFund(id) => {
                if self.max_selectable <= 1 {
                    self.input.selection = vec![id.clone()];
                } else if !self.input.selection.contains(&id) {
                    self.input.selection.push(id.clone());
                    self.input.selection.truncate(self.max_selectable);
                }
                Some(AuditEvent::Input { field: "fund".into(), value: id })
            }
            FormEvent::AmountInput(text) => {
                if validate::amount_text_acceptable(&text) {
                    self.input.amount_text = text.clone();
                    Some(AuditEvent::Input { field: "amount".into(), value: text })
                } else {
                    // non-conforming keystroke: field keeps its previous value
                    INPUT_REJECTS.inc();
                    debug!(%text, "amount input rejected");
                    Some(AuditEvent::InputRejected { field: "amount".into(), value: text })
                }
            }
            FormEvent::Submit => match self.submit() {
                SubmitOutcome::Ignored => None,
                SubmitOutcome::Invalid => Some(AuditEvent::Invalid {
                    fund: self.errors.fund.clone(),
                    amount: self.errors.amount.clone(),
                }),
                SubmitOutcome::Accepted(record) => Some(AuditEvent::Submitted(record)),
                SubmitOutcome::StoreFailed => Some(AuditEvent::StoreFailed(MSG_STORE_FAILED.into())),
            },
        }
    }

    pub fn submit(&mut self) -> SubmitOutcome {
        if self.phase == Phase::Submitted || !self.options_loaded {
            return SubmitOutcome::Ignored;
        }
        self.notice = None;

        let result = validate::validate(&self.input, self.bounds);
        if !result.is_valid {
            if !result.fund.is_empty() {
                VALIDATION_FAILURES.with_label_values(&["fund"]).inc();
            }
            if !result.amount.is_empty() {
                VALIDATION_FAILURES.with_label_values(&["amount"]).inc();
            }
            self.errors = result;
            return SubmitOutcome::Invalid;
        }
        self.errors = result;

        // is_valid guarantees the amount parses
        let Some(amount) = validate::parse_amount(&self.input.amount_text) else {
            return SubmitOutcome::Invalid;
        };
        let record = Investment {
            amount: format!("{:.2}", amount),
            funds: self.resolve_selection(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };

        match self.store.append(record.clone()) {
            Ok(all) => {
                HISTORY_RECORDS.set(all.len() as i64);
                SUBMISSIONS.inc();
                self.history = all;
                self.input = FormInput::default();
                self.errors = ValidationResult::default();
                self.phase = Phase::Submitted;
                info!(amount = %record.amount, "investment submitted");
                SubmitOutcome::Accepted(record)
            }
            Err(e) => {
                // fatal to this submission only: stay editing, keep the input
                warn!(?e, "history append failed");
                STORE_FAILURES.inc();
                self.notice = Some(MSG_STORE_FAILED.to_string());
                SubmitOutcome::StoreFailed
            }
        }
    }

    pub fn revert(&mut self) {
        self.phase = Phase::Editing;
        self.input = FormInput::default();
        self.errors = ValidationResult::default();
        REVERTS.inc();
    }

    /// Submit-button enablement. Derived, read-only; the validator remains
    /// the authoritative check at submit time.
    pub fn can_submit(&self) -> bool {
        if !self.options_loaded || self.funds.is_empty() {
            return false;
        }
        let selected = self.input.selection.iter().any(|id| !id.is_empty());
        let amount_ok = validate::parse_amount(&self.input.amount_text)
            .map(|a| a >= self.bounds.min)
            .unwrap_or(false);
        selected && amount_ok
    }

    fn resolve_selection(&self) -> Vec<Fund> {
        self.input
            .selection
            .iter()
            .filter(|id| !id.is_empty())
            .map(|id| {
                self.fund_index.get(id).cloned().unwrap_or_else(|| {
                    warn!(%id, "selected fund not in loaded list");
                    Fund { id: id.clone(), name: UNKNOWN_FUND_NAME.into() }
                })
            })
            .collect()
    }

    pub fn snapshot(&self) -> FormSnapshot {
        FormSnapshot {
            phase: self.phase,
            input: self.input.clone(),
            errors: self.errors.clone(),
            bounds: self.bounds,
            funds: self.funds.clone(),
            options_loaded: self.options_loaded,
            can_submit: self.can_submit(),
            notice: self.notice.clone(),
            history: self.history.clone(),
        }
    }
}

/// Controller task: UI events in, snapshots out. One pending options fetch,
/// one optional armed revert timer; both die with the task.
pub async fn run<S: HistoryStore>(
    mut ctl: FormController<S>,
    mut ev_rx: mpsc::Receiver<FormEvent>,
    mut opts_rx: mpsc::Receiver<OptionsPayload>,
    snap_tx: watch::Sender<FormSnapshot>,
    rec_tx: Option<mpsc::Sender<AuditEvent>>,
) {
    let mut revert_at: Option<Instant> = None;
    let mut opts_open = true;
    let _ = snap_tx.send(ctl.snapshot());

    loop {
        let revert = async move {
            match revert_at {
                Some(at) => sleep_until(at).await,
                None => futures_util::future::pending::<()>().await,
            }
        };

        tokio::select! {
            maybe_ev = ev_rx.recv() => {
                let Some(ev) = maybe_ev else {
                    // UI gone: stop; the armed timer is cancelled with us
                    debug!("event channel closed, controller stopping");
                    break;
                };
                let was_submit = matches!(ev, FormEvent::Submit);
                let audit = ctl.on_event(ev);
                if was_submit && matches!(audit, Some(AuditEvent::Submitted(_))) {
                    revert_at = Some(Instant::now() + ctl.revert_after());
                }
                record(&rec_tx, audit);
                let _ = snap_tx.send(ctl.snapshot());
            }

            maybe_opts = opts_rx.recv(), if opts_open => {
                match maybe_opts {
                    Some(payload) => {
                        record(&rec_tx, Some(AuditEvent::OptionsLoaded {
                            funds: payload.available_funds.len(),
                            min: payload.min_investment,
                            max: payload.max_investment,
                        }));
                        ctl.set_options(payload);
                        let _ = snap_tx.send(ctl.snapshot());
                    }
                    None => opts_open = false,
                }
            }

            _ = revert => {
                revert_at = None;
                ctl.revert();
                record(&rec_tx, Some(AuditEvent::Reverted));
                let _ = snap_tx.send(ctl.snapshot());
            }
        }
    }
}

fn record(rec_tx: &Option<mpsc::Sender<AuditEvent>>, ev: Option<AuditEvent>) {
    if let (Some(tx), Some(ev)) = (rec_tx, ev) {
        let _ = tx.try_send(ev);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{FailStore, MemStore};
    use crate::provider::mock_payload;

    const REVERT: Duration = Duration::from_secs(3);

    fn controller() -> FormController<MemStore> {
        let mut ctl = FormController::new(MemStore::new(), Bounds::default(), 1, REVERT);
        ctl.set_options(mock_payload());
        ctl
    }

    fn fill(ctl: &mut FormController<MemStore>, fund: &str, amount: &str) {
        ctl.on_event(FormEvent::SelectFund(fund.to_string()));
        ctl.on_event(FormEvent::AmountInput(amount.to_string()));
    }

    #[test]
    fn input_ignored_until_options_load() {
        let mut ctl = FormController::new(MemStore::new(), Bounds::default(), 1, REVERT);
        assert!(ctl.on_event(FormEvent::SelectFund("equities".into())).is_none());
        assert!(ctl.on_event(FormEvent::AmountInput("100".into())).is_none());
        assert_eq!(ctl.submit(), SubmitOutcome::Ignored);
        assert!(ctl.snapshot().input.selection.is_empty());
        assert!(!ctl.can_submit());
    }

    #[test]
    fn amount_keystroke_filter_keeps_previous_value() {
        let mut ctl = controller();
        ctl.on_event(FormEvent::AmountInput("100.5".into()));
        assert_eq!(ctl.snapshot().input.amount_text, "100.5");

        let rejected = ctl.on_event(FormEvent::AmountInput("100.555".into()));
        assert!(matches!(rejected, Some(AuditEvent::InputRejected { .. })));
        assert_eq!(ctl.snapshot().input.amount_text, "100.5");

        ctl.on_event(FormEvent::AmountInput("abc".into()));
        assert_eq!(ctl.snapshot().input.amount_text, "100.5");

        // clearing the field is a conforming edit
        ctl.on_event(FormEvent::AmountInput("".into()));
        assert_eq!(ctl.snapshot().input.amount_text, "");
    }

    #[test]
    fn single_select_replaces_selection() {
        let mut ctl = controller();
        ctl.on_event(FormEvent::SelectFund("equities".into()));
        ctl.on_event(FormEvent::SelectFund("bonds".into()));
        assert_eq!(ctl.snapshot().input.selection, vec!["bonds".to_string()]);
    }

    #[test]
    fn invalid_submit_keeps_editing_with_errors_and_no_record() {
        let mut ctl = controller();
        fill(&mut ctl, "", "10");
        assert_eq!(ctl.submit(), SubmitOutcome::Invalid);

        let snap = ctl.snapshot();
        assert_eq!(snap.phase, Phase::Editing);
        assert_eq!(snap.errors.fund, validate::MSG_FUND_REQUIRED);
        assert_eq!(snap.errors.amount, "Minimum investment is £25");
        assert!(snap.history.is_empty());
        // editing continues: input untouched
        assert_eq!(snap.input.amount_text, "10");
    }

    #[test]
    fn valid_submit_formats_appends_and_clears() {
        let mut ctl = controller();
        fill(&mut ctl, "equities", "100.5");
        let outcome = ctl.submit();

        let SubmitOutcome::Accepted(record) = outcome else {
            panic!("expected accepted submit, got {outcome:?}");
        };
        assert_eq!(record.amount, "100.50");
        assert_eq!(record.funds[0].name, "Cushon Equities Fund");
        assert!(chrono::DateTime::parse_from_rfc3339(&record.timestamp).is_ok());

        let snap = ctl.snapshot();
        assert_eq!(snap.phase, Phase::Submitted);
        assert_eq!(snap.input, FormInput::default());
        assert_eq!(snap.history.len(), 1);
        assert_eq!(snap.history[0], record);
    }

    #[test]
    fn unknown_fund_id_gets_placeholder_name() {
        let mut ctl = controller();
        fill(&mut ctl, "gilts", "100");
        let SubmitOutcome::Accepted(record) = ctl.submit() else {
            panic!("unknown fund must not block submission");
        };
        assert_eq!(record.funds[0].id, "gilts");
        assert_eq!(record.funds[0].name, UNKNOWN_FUND_NAME);
    }

    #[test]
    fn input_ignored_while_submitted_and_revert_resets() {
        let mut ctl = controller();
        fill(&mut ctl, "equities", "100");
        assert!(matches!(ctl.submit(), SubmitOutcome::Accepted(_)));

        assert!(ctl.on_event(FormEvent::SelectFund("bonds".into())).is_none());
        assert_eq!(ctl.submit(), SubmitOutcome::Ignored);

        ctl.revert();
        let snap = ctl.snapshot();
        assert_eq!(snap.phase, Phase::Editing);
        assert_eq!(snap.input, FormInput::default());
        assert_eq!(snap.errors, ValidationResult::default());
        assert_eq!(snap.history.len(), 1);
    }

    #[test]
    fn store_failure_rolls_back_to_editing_with_notice() {
        let mut ctl = FormController::new(FailStore, Bounds::default(), 1, REVERT);
        ctl.set_options(mock_payload());
        ctl.on_event(FormEvent::SelectFund("equities".into()));
        ctl.on_event(FormEvent::AmountInput("100".into()));

        assert_eq!(ctl.submit(), SubmitOutcome::StoreFailed);
        let snap = ctl.snapshot();
        assert_eq!(snap.phase, Phase::Editing);
        assert_eq!(snap.input.amount_text, "100");
        assert_eq!(snap.notice.as_deref(), Some(MSG_STORE_FAILED));
        assert!(snap.history.is_empty());
    }

    #[test]
    fn enablement_never_contradicts_the_validator() {
        // validator-valid inputs must always leave the button enabled
        let amounts = ["", "0", "10", "24.99", "25", "100.99", "100.999", "20000", "20000.01"];
        let funds = ["", "equities"];
        for fund in funds {
            for amount in amounts {
                let mut ctl = controller();
                fill(&mut ctl, fund, amount);
                let snap = ctl.snapshot();
                let valid = validate::validate(&snap.input, snap.bounds).is_valid;
                if valid {
                    assert!(snap.can_submit, "fund {fund:?} amount {amount:?}");
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn end_to_end_submit_then_auto_revert() {
        let ctl = FormController::new(MemStore::new(), Bounds::default(), 1, REVERT);
        let (ev_tx, ev_rx) = mpsc::channel(16);
        let (opts_tx, opts_rx) = mpsc::channel(1);
        let (snap_tx, mut snap_rx) = watch::channel(FormSnapshot::default());

        tokio::spawn(run(ctl, ev_rx, opts_rx, snap_tx, None));

        // initial publish: form disabled while the fetch is pending
        snap_rx.changed().await.unwrap();
        assert!(!snap_rx.borrow().options_loaded);

        opts_tx.send(mock_payload()).await.unwrap();
        snap_rx.changed().await.unwrap();
        {
            let snap = snap_rx.borrow();
            assert!(snap.options_loaded);
            assert_eq!(snap.bounds, Bounds { min: 25.0, max: 20_000.0 });
        }

        ev_tx.send(FormEvent::SelectFund("equities".into())).await.unwrap();
        snap_rx.changed().await.unwrap();
        ev_tx.send(FormEvent::AmountInput("100".into())).await.unwrap();
        snap_rx.changed().await.unwrap();
        assert!(snap_rx.borrow().can_submit);

        ev_tx.send(FormEvent::Submit).await.unwrap();
        snap_rx.changed().await.unwrap();
        {
            let snap = snap_rx.borrow();
            assert_eq!(snap.phase, Phase::Submitted);
            assert_eq!(snap.history.len(), 1);
            assert_eq!(snap.history[0].amount, "100.00");
            assert_eq!(snap.history[0].funds[0].name, "Cushon Equities Fund");
        }

        // paused clock: the 3s revert timer fires as soon as the runtime idles
        snap_rx.changed().await.unwrap();
        {
            let snap = snap_rx.borrow();
            assert_eq!(snap.phase, Phase::Editing);
            assert_eq!(snap.input, FormInput::default());
            assert_eq!(snap.history.len(), 1);
        }
    }
}
