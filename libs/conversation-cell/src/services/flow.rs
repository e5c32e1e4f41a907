// libs/conversation-cell/src/services/flow.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use scheduling_cell::dates::CalendarDate;
use scheduling_cell::models::{BookingConfirmation, BookingDraft, SchedulingError};
use scheduling_cell::services::booking::BookingOrchestrator;
use shared_config::AppConfig;
use shared_models::CallerRole;

use crate::models::{
    ConversationError, ConversationFlow, ConversationState, ExtractedEntities, Intent,
    TurnResponse,
};
use crate::notify::GatewayNotifier;
use crate::services::nlu::{normalize, MessageAnalyzer, PatternAnalyzer};

const MAX_RETRIES: u32 = 3;

/// Seam between the conversation and the booking core, so flow logic is
/// testable without a live store.
#[async_trait]
pub trait BookingExecutor: Send + Sync {
    async fn execute(
        &self,
        draft: &BookingDraft,
        contact: &str,
        organization_id: Uuid,
        caller_role: CallerRole,
        now: DateTime<Utc>,
    ) -> Result<BookingConfirmation, SchedulingError>;
}

#[async_trait]
impl BookingExecutor for BookingOrchestrator {
    async fn execute(
        &self,
        draft: &BookingDraft,
        contact: &str,
        organization_id: Uuid,
        caller_role: CallerRole,
        now: DateTime<Utc>,
    ) -> Result<BookingConfirmation, SchedulingError> {
        self.book(draft, contact, organization_id, caller_role, false, now)
            .await
    }
}

/// Drives one conversation turn: analyze the message, merge entities into
/// the draft, and decide the next state and reply. All mutation happens on
/// the flow the caller already holds locked.
pub struct FlowEngine {
    analyzer: Arc<dyn MessageAnalyzer>,
    booker: Arc<dyn BookingExecutor>,
    clinic_utc_offset_minutes: i32,
}

impl FlowEngine {
    pub fn new(config: &AppConfig) -> Self {
        let mut orchestrator = BookingOrchestrator::new(config);
        if let Some(gateway) = GatewayNotifier::from_config(config) {
            orchestrator = orchestrator.with_notifier(Arc::new(gateway));
        }
        Self {
            analyzer: Arc::new(PatternAnalyzer::new()),
            booker: Arc::new(orchestrator),
            clinic_utc_offset_minutes: config.clinic_utc_offset_minutes,
        }
    }

    pub fn with_parts(
        analyzer: Arc<dyn MessageAnalyzer>,
        booker: Arc<dyn BookingExecutor>,
        clinic_utc_offset_minutes: i32,
    ) -> Self {
        Self {
            analyzer,
            booker,
            clinic_utc_offset_minutes,
        }
    }

    pub async fn handle_turn(
        &self,
        flow: &mut ConversationFlow,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<TurnResponse, ConversationError> {
        let today = CalendarDate::today(now, self.clinic_utc_offset_minutes);
        let normalized = normalize(message);

        if flow.state.is_terminal() {
            return Ok(self.apply(
                flow,
                TurnResponse::finished(
                    "Esta conversación ha finalizado. Escríbenos de nuevo para empezar otra."
                        .to_string(),
                    flow.state,
                ),
            ));
        }

        // Exit words cut the flow from any state.
        if wants_exit(&normalized) {
            info!("Conversation with {} cancelled by the user", flow.contact);
            return Ok(self.apply(
                flow,
                TurnResponse::finished(
                    "De acuerdo, he cancelado el proceso. ¡Que tengas buen día!".to_string(),
                    ConversationState::Cancelled,
                ),
            ));
        }

        let analysis = self.analyzer.analyze(message, today).await?;

        if analysis.intent == Intent::HumanHandoff {
            return Ok(self.apply(
                flow,
                TurnResponse::handoff(
                    "Claro, en un momento te comunico con una persona del equipo.".to_string(),
                ),
            ));
        }

        merge_entities(&mut flow.draft, &analysis.entities);

        let response = match flow.state {
            ConversationState::Greeting | ConversationState::IntentDetection => {
                self.on_intent(flow, analysis.intent)
            }
            ConversationState::CollectService => self.on_collect_service(flow),
            ConversationState::CollectDate => self.on_collect_date(flow),
            ConversationState::CollectTime => self.on_collect_time(flow),
            ConversationState::CollectDoctor => self.on_collect_doctor(flow, &normalized),
            ConversationState::Confirm => {
                self.on_confirm(flow, &normalized, now).await?
            }
            // Terminal states returned above.
            _ => TurnResponse::finished(String::new(), flow.state),
        };

        Ok(self.apply(flow, response))
    }

    fn apply(&self, flow: &mut ConversationFlow, response: TurnResponse) -> TurnResponse {
        flow.state = response.new_state;
        response
    }

    fn on_intent(&self, flow: &mut ConversationFlow, intent: Intent) -> TurnResponse {
        match intent {
            Intent::BookAppointment => {
                flow.retries = 0;
                self.advance(flow)
            }
            Intent::RescheduleAppointment => TurnResponse::handoff(
                "Para cambiar una cita existente te comunico con recepción.".to_string(),
            ),
            Intent::CancelAppointment => TurnResponse::handoff(
                "Para cancelar una cita existente te comunico con recepción.".to_string(),
            ),
            Intent::CheckAvailability => TurnResponse::handoff(
                "Con gusto te comparto la disponibilidad; te comunico con recepción.".to_string(),
            ),
            Intent::GetInfo => TurnResponse::handoff(
                "Para precios y más información te comunico con recepción.".to_string(),
            ),
            // The greeting turn drops straight into the booking funnel: the
            // welcome prompt already asks for the service.
            _ if flow.state == ConversationState::Greeting => {
                let mut response = self.advance(flow);
                if flow.draft.service.is_none() {
                    response.reply = "¡Hola! Soy el asistente de la clínica. ¿Qué servicio \
                                      necesitas? Por ejemplo: examen visual completo, lentes \
                                      de contacto o terapia visual."
                        .to_string();
                    response.new_state = ConversationState::CollectService;
                }
                response
            }
            _ => self.retry_or_escalate(
                flow,
                "Puedo agendar tu cita: dime por ejemplo \"quiero agendar un examen visual\"."
                    .to_string(),
                ConversationState::IntentDetection,
            ),
        }
    }

    fn on_collect_service(&self, flow: &mut ConversationFlow) -> TurnResponse {
        if flow.draft.service.is_some() {
            flow.retries = 0;
            return self.advance(flow);
        }
        self.retry_or_escalate(
            flow,
            "¿Qué servicio necesitas? Por ejemplo: examen visual completo, lentes de contacto \
             o terapia visual."
                .to_string(),
            ConversationState::CollectService,
        )
    }

    fn on_collect_date(&self, flow: &mut ConversationFlow) -> TurnResponse {
        if flow.draft.date.is_some() {
            flow.retries = 0;
            return self.advance(flow);
        }
        self.retry_or_escalate(
            flow,
            "¿Para qué fecha? Puedes decir \"mañana\", un día como \"viernes\", o una fecha \
             como 15/04/2025."
                .to_string(),
            ConversationState::CollectDate,
        )
    }

    fn on_collect_time(&self, flow: &mut ConversationFlow) -> TurnResponse {
        if flow.draft.time.is_some() {
            flow.retries = 0;
            return self.advance(flow);
        }
        self.retry_or_escalate(
            flow,
            "¿A qué hora te gustaría? Atendemos de 08:00 a 20:00.".to_string(),
            ConversationState::CollectTime,
        )
    }

    fn on_collect_doctor(&self, flow: &mut ConversationFlow, normalized: &str) -> TurnResponse {
        let has_preference =
            flow.draft.doctor_id.is_some() || flow.draft.doctor_name.is_some();

        if has_preference || no_preference(normalized) {
            flow.retries = 0;
            return self.confirm_prompt(flow);
        }

        // After the ceiling the preference is simply dropped.
        flow.retries += 1;
        if flow.retries >= MAX_RETRIES {
            flow.retries = 0;
            return self.confirm_prompt(flow);
        }
        TurnResponse::continue_with(
            "¿Prefieres algún doctor en particular? Si no, dime \"cualquiera\".".to_string(),
            ConversationState::CollectDoctor,
        )
    }

    async fn on_confirm(
        &self,
        flow: &mut ConversationFlow,
        normalized: &str,
        now: DateTime<Utc>,
    ) -> Result<TurnResponse, ConversationError> {
        if is_affirmative(normalized) {
            return self.execute_booking(flow, now).await;
        }

        if is_negative(normalized) {
            return Ok(TurnResponse::handoff(
                "Entendido, no confirmo la cita. Te comunico con una persona para ayudarte."
                    .to_string(),
            ));
        }

        Ok(self.retry_or_escalate(
            flow,
            "¿Confirmo la cita? Responde \"sí\" para agendar o \"no\" para cancelar."
                .to_string(),
            ConversationState::Confirm,
        ))
    }

    async fn execute_booking(
        &self,
        flow: &mut ConversationFlow,
        now: DateTime<Utc>,
    ) -> Result<TurnResponse, ConversationError> {
        let result = self
            .booker
            .execute(
                &flow.draft,
                &flow.contact,
                flow.organization_id,
                flow.caller_role,
                now,
            )
            .await;

        match result {
            Ok(confirmation) => {
                info!(
                    "Conversation with {} booked appointment {}",
                    flow.contact, confirmation.appointment_id
                );
                Ok(TurnResponse::finished(
                    format!(
                        "¡Listo! Tu cita de {} quedó agendada para el {} {} a las {}. \
                         Tu código de confirmación es {}.",
                        confirmation.service,
                        confirmation.date.day_name(),
                        confirmation.date,
                        confirmation.time.format("%H:%M"),
                        confirmation.confirmation_code
                    ),
                    ConversationState::Completed,
                ))
            }
            Err(SchedulingError::ValidationFailed { errors, suggestions }) => {
                // Rejected slot: keep the service, drop date and time, and
                // let the user pick again with the suggestions in hand.
                flow.draft.date = None;
                flow.draft.time = None;
                flow.retries = 0;
                let mut reply = errors.join(" ");
                if !suggestions.is_empty() {
                    reply.push_str(&format!(" Sugerencias: {}.", suggestions.join("; ")));
                }
                reply.push_str(" ¿Qué otra fecha te gustaría?");
                Ok(TurnResponse::continue_with(reply, ConversationState::CollectDate))
            }
            Err(e) => {
                warn!("Booking failed for {}: {}", flow.contact, e);
                Ok(TurnResponse::handoff(
                    "Lo siento, no pude completar la reserva en este momento. Te comunico \
                     con una persona para terminar el proceso."
                        .to_string(),
                ))
            }
        }
    }

    /// Asks for the first missing field, or moves to doctor preference /
    /// confirmation once the draft is complete.
    fn advance(&self, flow: &mut ConversationFlow) -> TurnResponse {
        if flow.draft.service.is_none() {
            return TurnResponse::continue_with(
                "¡Con gusto! ¿Qué servicio necesitas? Por ejemplo: examen visual completo, \
                 lentes de contacto o terapia visual."
                    .to_string(),
                ConversationState::CollectService,
            );
        }
        if flow.draft.date.is_none() {
            return TurnResponse::continue_with(
                "Perfecto. ¿Para qué fecha te gustaría la cita?".to_string(),
                ConversationState::CollectDate,
            );
        }
        if flow.draft.time.is_none() {
            return TurnResponse::continue_with(
                "¿A qué hora te gustaría? Atendemos de 08:00 a 20:00.".to_string(),
                ConversationState::CollectTime,
            );
        }
        if flow.draft.doctor_id.is_none()
            && flow.draft.doctor_name.is_none()
            && flow.state != ConversationState::CollectDoctor
        {
            return TurnResponse::continue_with(
                "¿Prefieres algún doctor en particular? Si no, dime \"cualquiera\".".to_string(),
                ConversationState::CollectDoctor,
            );
        }
        self.confirm_prompt(flow)
    }

    fn confirm_prompt(&self, flow: &ConversationFlow) -> TurnResponse {
        let draft = &flow.draft;
        let service = draft.service.as_deref().unwrap_or("la cita");
        let date_text = draft
            .date
            .map(|d| format!("{} {}", d.day_name(), d))
            .unwrap_or_default();
        let time_text = draft
            .time
            .map(|t| t.format("%H:%M").to_string())
            .unwrap_or_default();
        let doctor_text = draft
            .doctor_name
            .as_deref()
            .map(|n| format!(" con {}", n))
            .unwrap_or_default();

        TurnResponse::continue_with(
            format!(
                "Confirmo: {} el {} a las {}{}. ¿Es correcto? (sí/no)",
                service, date_text, time_text, doctor_text
            ),
            ConversationState::Confirm,
        )
    }

    fn retry_or_escalate(
        &self,
        flow: &mut ConversationFlow,
        prompt: String,
        state: ConversationState,
    ) -> TurnResponse {
        flow.retries += 1;
        if flow.retries >= MAX_RETRIES {
            return TurnResponse::handoff(
                "No estoy logrando entenderte, una disculpa. Te comunico con una persona \
                 del equipo."
                    .to_string(),
            );
        }
        TurnResponse::continue_with(prompt, state)
    }
}

/// New entity values win over older ones so the user can correct themselves
/// ("mejor el jueves") in any state.
fn merge_entities(draft: &mut BookingDraft, entities: &ExtractedEntities) {
    if let Some(service) = &entities.service {
        draft.service = Some(service.value.clone());
    }
    if let Some(date) = &entities.date {
        draft.date = Some(date.value);
    }
    if let Some(time) = &entities.time {
        draft.time = Some(time.value);
    }
    if let Some(doctor) = &entities.doctor_name {
        draft.doctor_name = Some(doctor.value.clone());
    }
    if let Some(urgency) = entities.urgency {
        draft.urgency = Some(urgency);
    }
}

fn wants_exit(normalized: &str) -> bool {
    const EXIT_WORDS: &[&str] = &["salir", "terminar", "olvidalo", "adios"];
    normalized
        .split_whitespace()
        .any(|t| EXIT_WORDS.contains(&t))
        || normalized.contains("ya no quiero")
}

fn is_affirmative(normalized: &str) -> bool {
    const YES: &[&str] = &["si", "claro", "confirmo", "correcto", "ok", "dale", "perfecto", "sale"];
    normalized.split_whitespace().any(|t| YES.contains(&t))
}

fn is_negative(normalized: &str) -> bool {
    normalized.split_whitespace().any(|t| t == "no")
}

fn no_preference(normalized: &str) -> bool {
    normalized.contains("cualquiera")
        || normalized.contains("el que sea")
        || normalized.contains("la que sea")
        || normalized.contains("no importa")
        || is_negative(normalized)
}
