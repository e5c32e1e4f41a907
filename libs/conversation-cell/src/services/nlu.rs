// libs/conversation-cell/src/services/nlu.rs
//
// Pattern-based Spanish message analysis. Accent stripping happens once in
// normalization so every pattern below is written without accents.
use async_trait::async_trait;
use chrono::NaiveTime;
use regex::Regex;
use tracing::debug;

use scheduling_cell::dates::CalendarDate;
use scheduling_cell::models::Urgency;

use crate::models::{
    ConversationError, EntityMatch, ExtractedEntities, Intent, MessageAnalysis,
};

const BASE_CONFIDENCE: f32 = 0.7;
const MAX_CONFIDENCE: f32 = 0.95;
const LONG_MATCH_LEN: usize = 12;
const KEYWORD_HITS_FOR_BONUS: usize = 3;

/// Analysis collaborator. The pattern implementation below is the live one;
/// tests substitute scripted analyzers through this seam.
#[async_trait]
pub trait MessageAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        message: &str,
        today: CalendarDate,
    ) -> Result<MessageAnalysis, ConversationError>;
}

struct IntentFamily {
    intent: Intent,
    patterns: Vec<Regex>,
    keywords: &'static [&'static str],
}

pub struct PatternAnalyzer {
    families: Vec<IntentFamily>,
    time_clock: Regex,
    time_phrase: Regex,
    date_slash: Regex,
    date_spelled: Regex,
    date_weekday: Regex,
    doctor: Regex,
    opening: NaiveTime,
    closing: NaiveTime,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

impl Default for PatternAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternAnalyzer {
    pub fn new() -> Self {
        // Families compete on confidence; declaration order breaks ties, so
        // an explicit handoff request still wins an even match.
        let families = vec![
            IntentFamily {
                intent: Intent::HumanHandoff,
                patterns: compile(&[
                    r"hablar con (una persona|alguien|un humano|un asesor)",
                    r"\b(humano|asesor|operador|recepcionista)\b",
                    r"atencion humana",
                ]),
                keywords: &["hablar", "persona", "humano", "asesor", "operador"],
            },
            IntentFamily {
                intent: Intent::RescheduleAppointment,
                patterns: compile(&[
                    r"\b(reagendar|reprogramar)\b",
                    r"\b(cambiar|mover) (mi |la |una )?cita\b",
                ]),
                keywords: &["reagendar", "reprogramar", "cambiar", "mover", "cita"],
            },
            IntentFamily {
                intent: Intent::CancelAppointment,
                patterns: compile(&[r"\b(cancelar|anular)\b"]),
                keywords: &["cancelar", "anular", "cita"],
            },
            IntentFamily {
                intent: Intent::BookAppointment,
                patterns: compile(&[
                    r"\b(agendar|reservar|apartar)\b",
                    r"\b(quiero|necesito|quisiera|me gustaria) (una |un )?(cita|consulta|examen)\b",
                    r"\b(hacer|sacar) una cita\b",
                ]),
                keywords: &[
                    "agendar", "reservar", "apartar", "quiero", "necesito", "cita", "consulta",
                    "examen",
                ],
            },
            IntentFamily {
                intent: Intent::CheckAvailability,
                patterns: compile(&[
                    r"\bdisponibilidad\b",
                    r"\b(que|cuales) (dias|horarios)\b",
                    r"\bcuando (hay|tienen|atienden)\b",
                    r"\bespacios? disponibles?\b",
                    r"\bhorarios? disponibles?\b",
                ]),
                keywords: &["disponibilidad", "dias", "horarios", "espacios", "cuando"],
            },
            IntentFamily {
                intent: Intent::GetInfo,
                patterns: compile(&[
                    r"\b(precio|costo|precios|costos)\b",
                    r"\bcuanto (cuesta|vale|cobran)\b",
                    r"\b(direccion|ubicacion|donde estan|donde queda)\b",
                    r"\binformacion\b",
                ]),
                keywords: &[
                    "precio", "costo", "cuesta", "direccion", "ubicacion", "informacion",
                ],
            },
        ];

        Self {
            families,
            time_clock: Regex::new(r"\b(\d{1,2}):(\d{2})\s*(am|pm)?\b").unwrap(),
            time_phrase: Regex::new(
                r"\ba las? (\d{1,2})(?::(\d{2}))?(?:\s*(am|pm)|\s+de la (manana|tarde|noche))?\b",
            )
            .unwrap(),
            date_slash: Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap(),
            date_spelled: Regex::new(
                r"\b(?:el )?(\d{1,2}) de (enero|febrero|marzo|abril|mayo|junio|julio|agosto|septiembre|octubre|noviembre|diciembre)\b",
            )
            .unwrap(),
            date_weekday: Regex::new(
                r"\b(?:el |proximo |este )?(domingo|lunes|martes|miercoles|jueves|viernes|sabado)\b",
            )
            .unwrap(),
            doctor: Regex::new(r"\b(?:doctor|doctora|dr|dra)\.?\s+([a-z]+)").unwrap(),
            opening: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            closing: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
        }
    }

    /// Scores every matching family and keeps the highest-confidence one;
    /// declaration order only breaks exact ties.
    fn classify(&self, normalized: &str) -> (Intent, f32) {
        let mut best: Option<(Intent, f32)> = None;
        for family in &self.families {
            let longest = family
                .patterns
                .iter()
                .filter_map(|p| p.find(normalized))
                .max_by_key(|m| m.len());
            let Some(found) = longest else { continue };

            let mut confidence = BASE_CONFIDENCE;
            if found.len() >= LONG_MATCH_LEN {
                confidence += 0.1;
            }
            let keyword_hits = normalized
                .split_whitespace()
                .filter(|token| family.keywords.contains(token))
                .count();
            if keyword_hits >= KEYWORD_HITS_FOR_BONUS {
                confidence += 0.1;
            }
            let confidence = confidence.min(MAX_CONFIDENCE);
            if best.map_or(true, |(_, c)| confidence > c) {
                best = Some((family.intent, confidence));
            }
        }
        best.unwrap_or((Intent::Unknown, 0.0))
    }

    /// Time is extracted first and blanked out of the text so its qualifier
    /// words ("de la manana") cannot be re-read as the date "manana".
    fn extract_time(&self, normalized: &mut String) -> Option<EntityMatch<NaiveTime>> {
        let (range, time, confidence) = self.find_time(normalized)?;
        blank_range(normalized, range);
        Some(EntityMatch::new(time, confidence))
    }

    fn find_time(&self, text: &str) -> Option<(std::ops::Range<usize>, NaiveTime, f32)> {
        if let Some(caps) = self.time_clock.captures(text) {
            let full = caps.get(0)?;
            let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
            let minute: u32 = caps.get(2)?.as_str().parse().ok()?;
            let hour = adjust_hour(hour, caps.get(3).map(|m| m.as_str()))?;
            let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
            return Some((full.range(), time, 0.9));
        }

        if let Some(caps) = self.time_phrase.captures(text) {
            let full = caps.get(0)?;
            let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
            let minute: u32 = caps
                .get(2)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0);
            let period = caps.get(3).or(caps.get(4)).map(|m| m.as_str());
            let hour = adjust_hour(hour, period)?;
            let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
            let confidence = if period.is_some() { 0.85 } else { 0.6 };
            return Some((full.range(), time, confidence));
        }

        None
    }

    fn extract_date(&self, normalized: &str, today: CalendarDate) -> Option<EntityMatch<CalendarDate>> {
        if normalized.contains("pasado manana") {
            return Some(EntityMatch::new(today.add_days(2), 0.9));
        }
        if word_present(normalized, "manana") {
            return Some(EntityMatch::new(today.add_days(1), 0.9));
        }
        if word_present(normalized, "hoy") {
            return Some(EntityMatch::new(today, 0.9));
        }

        if let Some(caps) = self.date_slash.captures(normalized) {
            let day: u32 = caps.get(1)?.as_str().parse().ok()?;
            let month: u32 = caps.get(2)?.as_str().parse().ok()?;
            let year: i32 = caps.get(3)?.as_str().parse().ok()?;
            let date = CalendarDate::new(year, month, day).ok()?;
            return Some(EntityMatch::new(date, 0.9));
        }

        if let Some(caps) = self.date_spelled.captures(normalized) {
            let day: u32 = caps.get(1)?.as_str().parse().ok()?;
            let month = month_number(caps.get(2)?.as_str())?;
            // Year is inferred: a day/month already behind us means next year.
            let mut date = CalendarDate::new(today.year(), month, day).ok()?;
            if date < today {
                date = CalendarDate::new(today.year() + 1, month, day).ok()?;
            }
            return Some(EntityMatch::new(date, 0.85));
        }

        if let Some(caps) = self.date_weekday.captures(normalized) {
            let target = weekday_number(caps.get(1)?.as_str())?;
            // Next occurrence; naming today's weekday means next week.
            let mut delta = (target + 7 - today.weekday_index()) % 7;
            if delta == 0 {
                delta = 7;
            }
            return Some(EntityMatch::new(today.add_days(delta as i64), 0.8));
        }

        None
    }

    fn extract_service(&self, normalized: &str) -> Option<EntityMatch<String>> {
        // Longest aliases first so "examen visual completo" is not shadowed
        // by "examen visual".
        const ALIASES: &[(&str, &str)] = &[
            ("examen visual completo", "Examen Visual Completo"),
            ("adaptacion de lentes de contacto", "Adaptación de Lentes de Contacto"),
            ("lentes de contacto", "Adaptación de Lentes de Contacto"),
            ("examen de la vista", "Examen Visual Completo"),
            ("revision de la vista", "Examen Visual Completo"),
            ("examen completo", "Examen Visual Completo"),
            ("examen visual", "Examen Visual Completo"),
            ("terapia visual", "Terapia Visual"),
            ("presion ocular", "Tonometría"),
            ("tonometria", "Tonometría"),
            ("graduacion", "Examen de Graduación"),
        ];

        ALIASES
            .iter()
            .find(|(alias, _)| normalized.contains(alias))
            .map(|(_, canonical)| EntityMatch::new(canonical.to_string(), 0.9))
    }

    fn extract_doctor(&self, normalized: &str) -> Option<EntityMatch<String>> {
        self.doctor
            .captures(normalized)
            .and_then(|caps| caps.get(1))
            .map(|m| EntityMatch::new(m.as_str().to_string(), 0.8))
    }

    fn extract_urgency(&self, normalized: &str) -> Option<Urgency> {
        if normalized.contains("urgente")
            || normalized.contains("emergencia")
            || normalized.contains("lo antes posible")
            || normalized.contains("cuanto antes")
        {
            return Some(Urgency::High);
        }
        if normalized.contains("sin prisa")
            || normalized.contains("cuando puedan")
            || normalized.contains("no hay prisa")
        {
            return Some(Urgency::Low);
        }
        None
    }

    /// Drops entities that can never produce a bookable slot: past dates and
    /// times outside opening hours.
    fn validate_entities(&self, entities: &mut ExtractedEntities, today: CalendarDate) {
        if let Some(date) = &entities.date {
            if date.value < today {
                debug!("Dropping past date {}", date.value);
                entities.date = None;
            }
        }
        if let Some(time) = &entities.time {
            if time.value < self.opening || time.value >= self.closing {
                debug!("Dropping out-of-hours time {}", time.value);
                entities.time = None;
            }
        }
    }
}

#[async_trait]
impl MessageAnalyzer for PatternAnalyzer {
    async fn analyze(
        &self,
        message: &str,
        today: CalendarDate,
    ) -> Result<MessageAnalysis, ConversationError> {
        let mut normalized = normalize(message);
        if normalized.is_empty() {
            return Ok(MessageAnalysis::unknown());
        }

        let (intent, confidence) = self.classify(&normalized);

        let mut entities = ExtractedEntities {
            time: self.extract_time(&mut normalized),
            ..Default::default()
        };
        entities.date = self.extract_date(&normalized, today);
        entities.service = self.extract_service(&normalized);
        entities.doctor_name = self.extract_doctor(&normalized);
        entities.urgency = self.extract_urgency(&normalized);
        self.validate_entities(&mut entities, today);

        debug!("Message classified as {:?} ({:.2})", intent, confidence);

        Ok(MessageAnalysis {
            intent,
            confidence,
            entities,
        })
    }
}

/// Lowercase, accent-stripped, punctuation-free rendering with collapsed
/// whitespace. `:` and `/` survive for time and date literals.
pub fn normalize(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    for c in message.to_lowercase().chars() {
        let mapped = match c {
            'á' => 'a',
            'é' => 'e',
            'í' => 'i',
            'ó' => 'o',
            'ú' | 'ü' => 'u',
            'ñ' => 'n',
            c if c.is_alphanumeric() || c == ':' || c == '/' => c,
            _ => ' ',
        };
        out.push(mapped);
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn adjust_hour(hour: u32, period: Option<&str>) -> Option<u32> {
    if hour > 23 {
        return None;
    }
    match period {
        Some("pm") | Some("tarde") | Some("noche") if hour < 12 => Some(hour + 12),
        Some("am") if hour == 12 => Some(0),
        _ => Some(hour),
    }
}

fn blank_range(text: &mut String, range: std::ops::Range<usize>) {
    let blanked: String = " ".repeat(range.len());
    text.replace_range(range, &blanked);
}

fn word_present(text: &str, word: &str) -> bool {
    text.split_whitespace().any(|t| t == word)
}

fn month_number(name: &str) -> Option<u32> {
    let n = match name {
        "enero" => 1,
        "febrero" => 2,
        "marzo" => 3,
        "abril" => 4,
        "mayo" => 5,
        "junio" => 6,
        "julio" => 7,
        "agosto" => 8,
        "septiembre" => 9,
        "octubre" => 10,
        "noviembre" => 11,
        "diciembre" => 12,
        _ => return None,
    };
    Some(n)
}

fn weekday_number(name: &str) -> Option<u32> {
    let n = match name {
        "domingo" => 0,
        "lunes" => 1,
        "martes" => 2,
        "miercoles" => 3,
        "jueves" => 4,
        "viernes" => 5,
        "sabado" => 6,
        _ => return None,
    };
    Some(n)
}
