// Full conversation turns through the flow engine with a scripted booker.
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use conversation_cell::models::{ConversationFlow, ConversationState};
use conversation_cell::services::flow::{BookingExecutor, FlowEngine};
use conversation_cell::services::nlu::PatternAnalyzer;
use scheduling_cell::models::{BookingConfirmation, BookingDraft, SchedulingError};
use shared_models::CallerRole;

enum BookerScript {
    Succeed,
    Reject,
    Fail,
}

struct FakeBooker {
    script: BookerScript,
    calls: Mutex<Vec<BookingDraft>>,
}

impl FakeBooker {
    fn new(script: BookerScript) -> Self {
        Self {
            script,
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl BookingExecutor for FakeBooker {
    async fn execute(
        &self,
        draft: &BookingDraft,
        _contact: &str,
        _organization_id: Uuid,
        _caller_role: CallerRole,
        _now: DateTime<Utc>,
    ) -> Result<BookingConfirmation, SchedulingError> {
        self.calls.lock().unwrap().push(draft.clone());
        match self.script {
            BookerScript::Succeed => Ok(BookingConfirmation {
                appointment_id: Uuid::new_v4(),
                confirmation_code: "CITA-AB12CD34".to_string(),
                service: draft.service.clone().unwrap_or_default(),
                date: draft.date.unwrap(),
                time: draft.time.unwrap(),
                doctor_name: draft.doctor_name.clone(),
            }),
            BookerScript::Reject => Err(SchedulingError::ValidationFailed {
                errors: vec!["Las citas requieren al menos 24 horas de anticipación".to_string()],
                suggestions: vec!["Próximo horario válido: viernes 2025-03-14 a las 08:00".to_string()],
            }),
            BookerScript::Fail => Err(SchedulingError::PersistenceFailed("down".to_string())),
        }
    }
}

fn engine(booker: Arc<FakeBooker>) -> FlowEngine {
    FlowEngine::with_parts(Arc::new(PatternAnalyzer::new()), booker, -360)
}

fn fresh_flow(now: DateTime<Utc>) -> ConversationFlow {
    ConversationFlow::new("+5215512345678", Uuid::new_v4(), CallerRole::Patient, now, 30)
}

/// Wednesday 2025-03-12, noon clinic time.
fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 12, 18, 0, 0).unwrap()
}

#[tokio::test]
async fn happy_path_conversation_books_an_appointment() {
    let booker = Arc::new(FakeBooker::new(BookerScript::Succeed));
    let engine = engine(Arc::clone(&booker));
    let now = noon();
    let mut flow = fresh_flow(now);

    let r = engine.handle_turn(&mut flow, "hola", now).await.unwrap();
    assert_eq!(r.new_state, ConversationState::CollectService);
    assert!(r.reply.contains("servicio"));

    let r = engine
        .handle_turn(&mut flow, "quiero agendar un examen visual", now)
        .await
        .unwrap();
    assert_eq!(r.new_state, ConversationState::CollectDate);
    assert_eq!(flow.draft.service.as_deref(), Some("Examen Visual Completo"));

    let r = engine.handle_turn(&mut flow, "mañana", now).await.unwrap();
    assert_eq!(r.new_state, ConversationState::CollectTime);
    assert_eq!(flow.draft.date.unwrap().to_string(), "2025-03-13");

    let r = engine.handle_turn(&mut flow, "a las 10", now).await.unwrap();
    assert_eq!(r.new_state, ConversationState::CollectDoctor);

    let r = engine.handle_turn(&mut flow, "cualquiera", now).await.unwrap();
    assert_eq!(r.new_state, ConversationState::Confirm);
    assert!(r.reply.contains("Examen Visual Completo"));
    assert!(r.reply.contains("jueves 2025-03-13"));
    assert!(r.reply.contains("10:00"));

    let r = engine.handle_turn(&mut flow, "sí", now).await.unwrap();
    assert_eq!(r.new_state, ConversationState::Completed);
    assert!(!r.should_continue);
    assert!(r.reply.contains("CITA-AB12CD34"));

    let calls = booker.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].service.as_deref(), Some("Examen Visual Completo"));
    assert_eq!(calls[0].date.unwrap().to_string(), "2025-03-13");
}

/// One message carrying every entity goes straight to doctor preference.
#[tokio::test]
async fn single_message_with_all_entities_skips_collection() {
    let booker = Arc::new(FakeBooker::new(BookerScript::Succeed));
    let engine = engine(booker);
    let now = noon();
    let mut flow = fresh_flow(now);

    let r = engine
        .handle_turn(
            &mut flow,
            "quiero agendar un examen visual completo el viernes a las 16:00",
            now,
        )
        .await
        .unwrap();

    assert_eq!(r.new_state, ConversationState::CollectDoctor);
    assert_eq!(flow.draft.date.unwrap().to_string(), "2025-03-14");
}

/// Three consecutive unresolved replies in a collection state escalate.
#[tokio::test]
async fn repeated_gibberish_escalates_after_the_ceiling() {
    let booker = Arc::new(FakeBooker::new(BookerScript::Succeed));
    let engine = engine(booker);
    let now = noon();
    let mut flow = fresh_flow(now);

    let r = engine.handle_turn(&mut flow, "hola", now).await.unwrap();
    assert_eq!(r.new_state, ConversationState::CollectService);

    for _ in 0..2 {
        let r = engine.handle_turn(&mut flow, "zzz qqq", now).await.unwrap();
        assert!(r.should_continue);
        assert_eq!(r.new_state, ConversationState::CollectService);
    }
    let r = engine.handle_turn(&mut flow, "zzz qqq", now).await.unwrap();
    assert_eq!(r.new_state, ConversationState::Escalated);
    assert!(r.requires_human_handoff);
    assert!(!r.should_continue);
}

/// Spec scenario: greeting, bare service alias, relative date, then three
/// bad time replies end with a human.
#[tokio::test]
async fn service_alias_and_relative_date_then_time_failures_escalate() {
    let booker = Arc::new(FakeBooker::new(BookerScript::Succeed));
    let engine = engine(booker);
    let now = noon();
    let mut flow = fresh_flow(now);

    engine.handle_turn(&mut flow, "hola", now).await.unwrap();

    let r = engine.handle_turn(&mut flow, "examen completo", now).await.unwrap();
    assert_eq!(r.new_state, ConversationState::CollectDate);
    assert_eq!(flow.draft.service.as_deref(), Some("Examen Visual Completo"));

    let r = engine.handle_turn(&mut flow, "mañana", now).await.unwrap();
    assert_eq!(r.new_state, ConversationState::CollectTime);
    assert_eq!(flow.draft.date.unwrap().to_string(), "2025-03-13");

    for _ in 0..2 {
        let r = engine.handle_turn(&mut flow, "cuando se pueda", now).await.unwrap();
        assert_eq!(r.new_state, ConversationState::CollectTime);
    }
    let r = engine.handle_turn(&mut flow, "cuando se pueda", now).await.unwrap();
    assert_eq!(r.new_state, ConversationState::Escalated);
}

#[tokio::test]
async fn exit_word_cancels_from_any_state() {
    let booker = Arc::new(FakeBooker::new(BookerScript::Succeed));
    let engine = engine(booker);
    let now = noon();
    let mut flow = fresh_flow(now);

    engine
        .handle_turn(&mut flow, "quiero agendar un examen visual", now)
        .await
        .unwrap();
    let r = engine.handle_turn(&mut flow, "olvídalo", now).await.unwrap();
    assert_eq!(r.new_state, ConversationState::Cancelled);
    assert!(!r.should_continue);
}

#[tokio::test]
async fn handoff_request_escalates_mid_collection() {
    let booker = Arc::new(FakeBooker::new(BookerScript::Succeed));
    let engine = engine(booker);
    let now = noon();
    let mut flow = fresh_flow(now);

    engine
        .handle_turn(&mut flow, "quiero agendar un examen visual", now)
        .await
        .unwrap();
    let r = engine
        .handle_turn(&mut flow, "mejor quiero hablar con un asesor", now)
        .await
        .unwrap();
    assert_eq!(r.new_state, ConversationState::Escalated);
    assert!(r.requires_human_handoff);
}

/// A rules rejection surfaces the errors and suggestions, drops date and
/// time, and resumes at date collection.
#[tokio::test]
async fn rejected_booking_returns_to_date_collection() {
    let booker = Arc::new(FakeBooker::new(BookerScript::Reject));
    let engine = engine(Arc::clone(&booker));
    let now = noon();
    let mut flow = fresh_flow(now);

    engine
        .handle_turn(&mut flow, "agendar examen visual mañana a las 10:00", now)
        .await
        .unwrap();
    engine.handle_turn(&mut flow, "cualquiera", now).await.unwrap();
    let r = engine.handle_turn(&mut flow, "sí", now).await.unwrap();

    assert_eq!(r.new_state, ConversationState::CollectDate);
    assert!(r.should_continue);
    assert!(r.reply.contains("24 horas de anticipación"));
    assert!(r.reply.contains("viernes 2025-03-14"));
    assert!(flow.draft.date.is_none());
    assert!(flow.draft.time.is_none());
    assert_eq!(flow.draft.service.as_deref(), Some("Examen Visual Completo"));
}

#[tokio::test]
async fn hard_booking_failure_escalates() {
    let booker = Arc::new(FakeBooker::new(BookerScript::Fail));
    let engine = engine(booker);
    let now = noon();
    let mut flow = fresh_flow(now);

    engine
        .handle_turn(&mut flow, "agendar examen visual mañana a las 10:00", now)
        .await
        .unwrap();
    engine.handle_turn(&mut flow, "cualquiera", now).await.unwrap();
    let r = engine.handle_turn(&mut flow, "sí", now).await.unwrap();

    assert_eq!(r.new_state, ConversationState::Escalated);
    assert!(r.requires_human_handoff);
}

/// The same script on two fresh flows produces identical replies: the
/// engine has no hidden clock or randomness.
#[tokio::test]
async fn identical_scripts_produce_identical_conversations() {
    let now = noon();
    let script = [
        "hola",
        "quiero agendar un examen visual",
        "mañana",
        "a las 10",
        "cualquiera",
        "sí",
    ];

    let mut transcripts = Vec::new();
    for _ in 0..2 {
        let booker = Arc::new(FakeBooker::new(BookerScript::Succeed));
        let engine = engine(booker);
        let mut flow = fresh_flow(now);
        let mut replies = Vec::new();
        for message in &script {
            let r = engine.handle_turn(&mut flow, message, now).await.unwrap();
            replies.push((r.reply, r.new_state));
        }
        transcripts.push(replies);
    }

    assert_eq!(transcripts[0], transcripts[1]);
}
