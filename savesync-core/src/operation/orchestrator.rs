use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{debug, error, info};

use super::{Completion, LabelSource, Operation, OperationHandle, OperationKind, OperationState, OperationStatus};
use crate::completion::{CompletionEvent, RequestId, SubscriptionId};
use crate::context::OperationContext;
use crate::error::SaveError;
use crate::record::SaveId;
use crate::slot::{SlotResolver, SlotTarget};

/// Outcome of dispatching an operation.
enum Dispatch {
    /// The store accepted the request; a completion event will follow.
    Awaiting(oneshot::Receiver<CompletionEvent>),
    SkippedLocked,
}

/// Runs one operation at a time against an [`OperationContext`].
///
/// `begin` starts an operation and `poll` drives it to its terminal state.
/// Neither blocks. The store reports the outcome through the completion bus;
/// each `begin` gets a fresh request ID and one-shot channel, so only one
/// event, the answer to that request, can resolve it. Orchestrators sharing
/// a bus never see each other's answers.
pub struct Orchestrator {
    ctx: OperationContext,
    state: OperationState,
    next_handle: u64,
    current: Option<OperationHandle>,
    kind: Option<OperationKind>,
    receiver: Option<oneshot::Receiver<CompletionEvent>>,
    subscriptions: Vec<SubscriptionId>,
    outcome: Option<Result<Completion, SaveError>>,
}

impl Orchestrator {
    pub fn new(ctx: OperationContext) -> Self {
        Self {
            ctx,
            state: OperationState::Idle,
            next_handle: 1,
            current: None,
            kind: None,
            receiver: None,
            subscriptions: Vec::new(),
            outcome: None,
        }
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    /// Starts an operation.
    ///
    /// While an operation is running this does nothing and returns the
    /// running operation's handle.
    pub fn begin(&mut self, operation: Operation) -> OperationHandle {
        if self.state == OperationState::Running {
            if let Some(handle) = self.current {
                debug!("{:?} requested while operation {} is running", operation.kind, handle.0);
                return handle;
            }
        }

        self.release_subscriptions();
        self.outcome = None;

        let handle = OperationHandle(self.next_handle);
        self.next_handle += 1;
        self.current = Some(handle);
        self.kind = Some(operation.kind);
        self.state = OperationState::Running;

        match self.dispatch(&operation) {
            Ok(Dispatch::Awaiting(receiver)) => self.receiver = Some(receiver),
            Ok(Dispatch::SkippedLocked) => {
                info!("Saving is locked, skipping {:?}", operation.kind);
                self.finish(Ok(Completion::SkippedLocked));
            }
            Err(e) => {
                error!("{:?} failed before reaching the record store: {}", operation.kind, e);
                self.finish(Err(e));
            }
        }

        handle
    }

    /// Drives an operation.
    ///
    /// The terminal result is handed out once. Later polls of the same
    /// handle, and polls of any other handle, yield `UnknownHandle`.
    pub fn poll(&mut self, handle: OperationHandle) -> OperationStatus {
        if self.current != Some(handle) {
            return OperationStatus::Done(Err(SaveError::UnknownHandle(handle.0)));
        }

        if self.state == OperationState::Running {
            let received = match self.receiver.as_mut() {
                Some(receiver) => receiver.try_recv(),
                None => Err(TryRecvError::Closed),
            };
            match received {
                Ok(event) => self.finish(outcome_of(event)),
                Err(TryRecvError::Empty) => return OperationStatus::Pending,
                Err(TryRecvError::Closed) => self.finish(Err(SaveError::OperationFailed {
                    save_id: None,
                    reason: Some("completion channel closed".to_string()),
                })),
            }
        }

        self.current = None;
        match self.outcome.take() {
            Some(result) => OperationStatus::Done(result),
            None => OperationStatus::Done(Err(SaveError::UnknownHandle(handle.0))),
        }
    }

    fn dispatch(&mut self, operation: &Operation) -> Result<Dispatch, SaveError> {
        let request = self.ctx.bus.next_request();
        let receiver = self.subscribe(operation.kind, request);

        let label = self.resolve_label(operation)?;

        let target = if operation.kind.skips_slot() {
            None
        } else {
            let resolver = SlotResolver::new(self.ctx.variables.as_ref(), self.ctx.menus.as_ref());
            Some(resolver.resolve(&operation.addressing, operation.kind)?)
        };

        if operation.kind.is_save() && self.ctx.saving_lock.is_locked() {
            return Ok(Dispatch::SkippedLocked);
        }

        let store = &self.ctx.records;
        let label = label.as_deref();
        let selective = operation.selective_load.as_ref();

        match (operation.kind, target) {
            (OperationKind::ContinueLastSave, _) => store.continue_last_save(request, selective)?,
            (OperationKind::SaveNew, _) => store.save_new(request, label)?,
            (OperationKind::Save, Some(SlotTarget::Autosave)) => store.save_autosave(request)?,
            (OperationKind::Save, Some(target)) => {
                store.save(request, target, operation.update_label, label)?
            }
            (OperationKind::Load, Some(SlotTarget::Autosave)) => {
                store.load_autosave(request, selective)?
            }
            (OperationKind::Load, Some(target)) => store.load(request, target, selective)?,
            (OperationKind::Delete, Some(SlotTarget::Autosave)) => {
                store.delete(request, SlotTarget::Id(SaveId::AUTOSAVE))?
            }
            (OperationKind::Delete, Some(target)) => store.delete(request, target)?,
            (OperationKind::Rename, Some(target)) => {
                store.rename(request, label.unwrap_or_default(), target)?
            }
            (kind, None) => {
                return Err(SaveError::Store(format!("{:?} needs a resolved slot", kind)));
            }
        }

        Ok(Dispatch::Awaiting(receiver))
    }

    fn resolve_label(&self, operation: &Operation) -> Result<Option<String>, SaveError> {
        if !operation.wants_label() {
            return Ok(None);
        }
        match &operation.label {
            LabelSource::None => Ok(None),
            LabelSource::Literal(text) => Ok(Some(text.clone())),
            LabelSource::Variable(id) => self
                .ctx
                .variables
                .get_text(*id, &self.ctx.language)
                .map(Some)
                .ok_or(SaveError::MissingVariable(*id)),
        }
    }

    /// Subscribes to both topics of `kind`, sharing one sender between them.
    /// Events answering other requests are ignored.
    fn subscribe(
        &mut self,
        kind: OperationKind,
        request: RequestId,
    ) -> oneshot::Receiver<CompletionEvent> {
        let (tx, rx) = oneshot::channel();
        let sender = Arc::new(Mutex::new(Some(tx)));

        let (finish, fail) = kind.topics();
        for topic in [finish, fail] {
            let sender = Arc::clone(&sender);
            let id = self.ctx.bus.subscribe(topic, move |event| {
                if event.request != Some(request) {
                    return;
                }
                let tx = sender.lock().unwrap_or_else(PoisonError::into_inner).take();
                if let Some(tx) = tx {
                    let _ = tx.send(event.clone());
                }
            });
            self.subscriptions.push(id);
        }

        rx
    }

    fn release_subscriptions(&mut self) {
        for id in self.subscriptions.drain(..) {
            self.ctx.bus.unsubscribe(id);
        }
    }

    fn finish(&mut self, result: Result<Completion, SaveError>) {
        self.release_subscriptions();
        self.receiver = None;

        let kind = self.kind.take();
        self.state = match &result {
            Ok(completion) => {
                debug!("{:?} completed: {:?}", kind, completion);
                OperationState::Completed
            }
            Err(e) => {
                error!("{:?} failed: {}", kind, e);
                OperationState::Failed
            }
        };
        self.outcome = Some(result);
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.release_subscriptions();
    }
}

fn outcome_of(event: CompletionEvent) -> Result<Completion, SaveError> {
    if event.topic.is_failure() {
        Err(SaveError::OperationFailed {
            save_id: event.save_id,
            reason: event.detail,
        })
    } else {
        Ok(Completion::Finished {
            save_id: event.save_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CompletionBus, Topic};
    use crate::context::{LockFlag, MemoryVariables, StaticMenus};
    use crate::record::SelectiveLoad;
    use crate::slot::AddressingRequest;
    use crate::store::RecordStore;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Delete(SlotTarget),
        Rename(String, SlotTarget),
        Save(SlotTarget, bool, Option<String>),
        SaveNew(Option<String>),
        Load(SlotTarget, Option<SelectiveLoad>),
        ContinueLastSave,
        SaveAutosave,
        LoadAutosave,
    }

    /// Records calls. When `respond` is set, publishes that outcome before
    /// returning.
    struct RecordingStore {
        bus: CompletionBus,
        respond: Option<bool>,
        calls: Mutex<Vec<Call>>,
        requests: Mutex<Vec<RequestId>>,
    }

    impl RecordingStore {
        fn new(bus: CompletionBus, respond: Option<bool>) -> Self {
            Self {
                bus,
                respond,
                calls: Mutex::new(Vec::new()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn last_request(&self) -> RequestId {
            *self.requests.lock().unwrap().last().unwrap()
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(
            &self,
            request: RequestId,
            call: Call,
            finish: Topic,
            fail: Topic,
        ) -> Result<(), SaveError> {
            self.calls.lock().unwrap().push(call);
            self.requests.lock().unwrap().push(request);
            match self.respond {
                Some(true) => {
                    self.bus.publish(
                        CompletionEvent::new(finish)
                            .with_request(request)
                            .with_save_id(SaveId(3)),
                    );
                }
                Some(false) => {
                    self.bus.publish(
                        CompletionEvent::new(fail)
                            .with_request(request)
                            .with_detail("disk full"),
                    );
                }
                None => {}
            }
            Ok(())
        }
    }

    impl RecordStore for RecordingStore {
        fn delete(&self, request: RequestId, target: SlotTarget) -> Result<(), SaveError> {
            self.record(request, Call::Delete(target), Topic::FinishDeleting, Topic::FailDeleting)
        }

        fn rename(&self, request: RequestId, label: &str, target: SlotTarget) -> Result<(), SaveError> {
            self.record(
                request,
                Call::Rename(label.to_string(), target),
                Topic::FinishRenaming,
                Topic::FailRenaming,
            )
        }

        fn save(
            &self,
            request: RequestId,
            target: SlotTarget,
            update_label: bool,
            label: Option<&str>,
        ) -> Result<(), SaveError> {
            self.record(
                request,
                Call::Save(target, update_label, label.map(str::to_string)),
                Topic::FinishSaving,
                Topic::FailSaving,
            )
        }

        fn save_new(&self, request: RequestId, label: Option<&str>) -> Result<(), SaveError> {
            self.record(
                request,
                Call::SaveNew(label.map(str::to_string)),
                Topic::FinishSaving,
                Topic::FailSaving,
            )
        }

        fn load(
            &self,
            request: RequestId,
            target: SlotTarget,
            selective: Option<&SelectiveLoad>,
        ) -> Result<(), SaveError> {
            self.record(
                request,
                Call::Load(target, selective.copied()),
                Topic::FinishLoading,
                Topic::FailLoading,
            )
        }

        fn continue_last_save(
            &self,
            request: RequestId,
            _selective: Option<&SelectiveLoad>,
        ) -> Result<(), SaveError> {
            self.record(request, Call::ContinueLastSave, Topic::FinishLoading, Topic::FailLoading)
        }

        fn save_autosave(&self, request: RequestId) -> Result<(), SaveError> {
            self.record(request, Call::SaveAutosave, Topic::FinishSaving, Topic::FailSaving)
        }

        fn load_autosave(
            &self,
            request: RequestId,
            _selective: Option<&SelectiveLoad>,
        ) -> Result<(), SaveError> {
            self.record(request, Call::LoadAutosave, Topic::FinishLoading, Topic::FailLoading)
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        store: Arc<RecordingStore>,
        lock: Arc<LockFlag>,
        bus: CompletionBus,
    }

    fn harness(respond: Option<bool>) -> Harness {
        let bus = CompletionBus::new();
        let store = Arc::new(RecordingStore::new(bus.clone(), respond));
        let lock = Arc::new(LockFlag::new(false));

        let mut vars = MemoryVariables::new();
        vars.set_integer(1, 2);
        vars.set_text(5, "en", "Lighthouse");

        let ctx = OperationContext {
            records: store.clone(),
            variables: Arc::new(vars),
            menus: Arc::new(StaticMenus::new().with_saves_list("Load", "SavesList", 4)),
            saving_lock: lock.clone(),
            bus: bus.clone(),
            language: "en".to_string(),
        };

        Harness {
            orchestrator: Orchestrator::new(ctx),
            store,
            lock,
            bus,
        }
    }

    impl Harness {
        /// Publishes an answer to the store's most recent request.
        fn reply(&self, event: CompletionEvent) -> usize {
            self.bus.publish(event.with_request(self.store.last_request()))
        }
    }

    fn expect_done(status: OperationStatus) -> Result<Completion, SaveError> {
        match status {
            OperationStatus::Done(result) => result,
            OperationStatus::Pending => panic!("operation still pending"),
        }
    }

    #[test]
    fn test_delete_by_persisted_id_completes_on_event() {
        let mut h = harness(None);

        let handle = h
            .orchestrator
            .begin(Operation::delete(AddressingRequest::ByPersistedId(SaveId(3))));

        assert_eq!(h.store.calls(), vec![Call::Delete(SlotTarget::Id(SaveId(3)))]);
        assert_eq!(h.orchestrator.state(), OperationState::Running);
        assert!(h.orchestrator.poll(handle).is_pending());

        h.reply(CompletionEvent::new(Topic::FinishDeleting).with_save_id(SaveId(3)));

        let result = expect_done(h.orchestrator.poll(handle)).unwrap();
        assert_eq!(
            result,
            Completion::Finished {
                save_id: Some(SaveId(3))
            }
        );
        assert_eq!(h.orchestrator.state(), OperationState::Completed);
        assert_eq!(h.bus.total_subscribers(), 0);
    }

    #[test]
    fn test_rename_with_missing_label_variable() {
        let mut h = harness(Some(true));

        let handle = h.orchestrator.begin(Operation::rename(
            AddressingRequest::ByExplicitIndex(1),
            LabelSource::Variable(42),
        ));

        let err = expect_done(h.orchestrator.poll(handle)).unwrap_err();
        assert!(matches!(err, SaveError::MissingVariable(42)));
        assert!(h.store.calls().is_empty());
        assert_eq!(h.orchestrator.state(), OperationState::Failed);
        assert_eq!(h.bus.total_subscribers(), 0);
    }

    #[test]
    fn test_save_while_locked_skips_store() {
        let mut h = harness(Some(true));
        h.lock.set(true);

        let handle = h
            .orchestrator
            .begin(Operation::save(AddressingRequest::ByExplicitIndex(0)));

        assert_eq!(h.orchestrator.state(), OperationState::Completed);
        let result = expect_done(h.orchestrator.poll(handle)).unwrap();
        assert_eq!(result, Completion::SkippedLocked);
        assert!(h.store.calls().is_empty());
        assert_eq!(h.bus.total_subscribers(), 0);
    }

    #[test]
    fn test_lock_does_not_affect_loads() {
        let mut h = harness(Some(true));
        h.lock.set(true);

        let handle = h
            .orchestrator
            .begin(Operation::load(AddressingRequest::ByExplicitIndex(0)));

        assert!(expect_done(h.orchestrator.poll(handle)).is_ok());
        assert_eq!(h.store.calls(), vec![Call::Load(SlotTarget::Index(0), None)]);
    }

    #[test]
    fn test_begin_while_running_is_noop() {
        let mut h = harness(None);

        let first = h
            .orchestrator
            .begin(Operation::load(AddressingRequest::ByExplicitIndex(1)));
        let second = h
            .orchestrator
            .begin(Operation::delete(AddressingRequest::ByExplicitIndex(2)));

        assert_eq!(first, second);
        assert_eq!(h.store.calls().len(), 1);
        assert_eq!(h.bus.total_subscribers(), 2);
    }

    #[test]
    fn test_single_terminal_event() {
        let mut h = harness(None);
        let handle = h
            .orchestrator
            .begin(Operation::save(AddressingRequest::ByExplicitIndex(1)));

        h.reply(CompletionEvent::new(Topic::FailSaving).with_detail("first"));
        h.reply(CompletionEvent::new(Topic::FinishSaving));

        let err = expect_done(h.orchestrator.poll(handle)).unwrap_err();
        match err {
            SaveError::OperationFailed { reason, .. } => {
                assert_eq!(reason.as_deref(), Some("first"))
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(h.bus.total_subscribers(), 0);

        // The result is handed out once.
        assert!(matches!(
            expect_done(h.orchestrator.poll(handle)),
            Err(SaveError::UnknownHandle(_))
        ));
    }

    #[test]
    fn test_event_published_during_store_call() {
        let mut h = harness(Some(false));

        let handle = h
            .orchestrator
            .begin(Operation::save_new(LabelSource::Literal("Dock".to_string())));

        assert_eq!(h.store.calls(), vec![Call::SaveNew(Some("Dock".to_string()))]);
        assert!(expect_done(h.orchestrator.poll(handle)).is_err());
        assert_eq!(h.orchestrator.state(), OperationState::Failed);
        assert_eq!(h.bus.total_subscribers(), 0);
    }

    #[test]
    fn test_unrelated_topics_do_not_resolve() {
        let mut h = harness(None);
        let handle = h
            .orchestrator
            .begin(Operation::load(AddressingRequest::ByExplicitIndex(0)));

        h.reply(CompletionEvent::new(Topic::FinishSaving));
        assert!(h.orchestrator.poll(handle).is_pending());
    }

    #[test]
    fn test_answers_to_other_requests_are_ignored() {
        let mut h = harness(None);
        let handle = h
            .orchestrator
            .begin(Operation::save(AddressingRequest::ByExplicitIndex(0)));

        h.bus.publish(CompletionEvent::new(Topic::FinishSaving));
        h.bus.publish(
            CompletionEvent::new(Topic::FinishSaving).with_request(RequestId(u64::MAX)),
        );
        assert!(h.orchestrator.poll(handle).is_pending());
        assert_eq!(h.bus.total_subscribers(), 2);
    }

    #[test]
    fn test_orchestrators_sharing_a_bus_resolve_independently() {
        let mut h = harness(None);
        let mut other = Orchestrator::new(h.orchestrator.ctx.clone());

        let first = h
            .orchestrator
            .begin(Operation::save(AddressingRequest::ByPersistedId(SaveId(1))));
        let first_request = h.store.last_request();
        let second = other.begin(Operation::save(AddressingRequest::ByPersistedId(SaveId(2))));
        let second_request = h.store.last_request();
        assert_ne!(first_request, second_request);

        let delivered = h.bus.publish(
            CompletionEvent::new(Topic::FinishSaving)
                .with_request(first_request)
                .with_save_id(SaveId(1)),
        );
        assert_eq!(delivered, 2);

        assert_eq!(
            expect_done(h.orchestrator.poll(first)).unwrap(),
            Completion::Finished {
                save_id: Some(SaveId(1))
            }
        );
        assert!(other.poll(second).is_pending());

        h.bus.publish(
            CompletionEvent::new(Topic::FinishSaving)
                .with_request(second_request)
                .with_save_id(SaveId(2)),
        );
        assert_eq!(
            expect_done(other.poll(second)).unwrap(),
            Completion::Finished {
                save_id: Some(SaveId(2))
            }
        );
        assert_eq!(h.bus.total_subscribers(), 0);
    }

    #[test]
    fn test_ui_offset_and_variable_addressing_reach_store() {
        let mut h = harness(Some(true));

        let handle = h.orchestrator.begin(Operation::load(AddressingRequest::ByUiOffsetIndex {
            index: 1,
            menu: "Load".to_string(),
            element: "SavesList".to_string(),
        }));
        assert!(expect_done(h.orchestrator.poll(handle)).is_ok());

        let handle = h
            .orchestrator
            .begin(Operation::delete(AddressingRequest::ByVariableIndex(1)));
        assert!(expect_done(h.orchestrator.poll(handle)).is_ok());

        assert_eq!(
            h.store.calls(),
            vec![
                Call::Load(SlotTarget::Index(5), None),
                Call::Delete(SlotTarget::Index(2))
            ]
        );
    }

    #[test]
    fn test_resolution_failure_makes_no_store_call() {
        let mut h = harness(Some(true));

        let handle = h.orchestrator.begin(Operation::load(AddressingRequest::ByUiOffsetIndex {
            index: 0,
            menu: "Pause".to_string(),
            element: "SavesList".to_string(),
        }));
        assert!(matches!(
            expect_done(h.orchestrator.poll(handle)),
            Err(SaveError::MissingUIElement { .. })
        ));

        let handle = h.orchestrator.begin(Operation::rename(
            AddressingRequest::Autosave,
            LabelSource::Literal("x".to_string()),
        ));
        assert!(matches!(
            expect_done(h.orchestrator.poll(handle)),
            Err(SaveError::AutosaveImmutable)
        ));
        assert!(h.store.calls().is_empty());
    }

    #[test]
    fn test_autosave_routing() {
        let mut h = harness(Some(true));

        for operation in [
            Operation::save(AddressingRequest::Autosave)
                .with_update_label(true)
                .with_label(LabelSource::Variable(999)),
            Operation::load(AddressingRequest::Autosave),
            Operation::delete(AddressingRequest::Autosave),
        ] {
            let handle = h.orchestrator.begin(operation);
            assert!(expect_done(h.orchestrator.poll(handle)).is_ok());
        }

        assert_eq!(
            h.store.calls(),
            vec![
                Call::SaveAutosave,
                Call::LoadAutosave,
                Call::Delete(SlotTarget::Id(SaveId::AUTOSAVE))
            ]
        );
    }

    #[test]
    fn test_labels_and_selective_load() {
        let mut h = harness(Some(true));

        let filter = SelectiveLoad::only(&[crate::record::StateSection::Inventory]);
        let operations = [
            Operation::save(AddressingRequest::ByExplicitIndex(2))
                .with_update_label(true)
                .with_label(LabelSource::Variable(5)),
            Operation::save(AddressingRequest::ByExplicitIndex(2))
                .with_label(LabelSource::Literal("kept".to_string())),
            Operation::load(AddressingRequest::ByPersistedId(SaveId(7))).with_selective_load(filter),
            Operation::continue_last_save(),
        ];
        for operation in operations {
            let handle = h.orchestrator.begin(operation);
            assert!(expect_done(h.orchestrator.poll(handle)).is_ok());
        }

        assert_eq!(
            h.store.calls(),
            vec![
                Call::Save(SlotTarget::Index(2), true, Some("Lighthouse".to_string())),
                Call::Save(SlotTarget::Index(2), false, None),
                Call::Load(SlotTarget::Id(SaveId(7)), Some(filter)),
                Call::ContinueLastSave,
            ]
        );
    }

    #[test]
    fn test_poll_unknown_handle() {
        let mut h = harness(None);
        assert!(matches!(
            expect_done(h.orchestrator.poll(OperationHandle(77))),
            Err(SaveError::UnknownHandle(77))
        ));
        assert_eq!(h.orchestrator.state(), OperationState::Idle);
    }

    #[test]
    fn test_drop_releases_subscriptions() {
        let mut h = harness(None);
        h.orchestrator
            .begin(Operation::load(AddressingRequest::ByExplicitIndex(0)));
        assert_eq!(h.bus.total_subscribers(), 2);

        drop(h.orchestrator);
        assert_eq!(h.bus.total_subscribers(), 0);
    }
}
