//! Field tables and member aliases for every bound record type.

use minijinja::Value;
use once_cell::sync::Lazy;

use super::{fold_key, json, list, opt_text, percent_of, text, Binding, FieldResolver, FieldTable};
use crate::context::format::{affinity_tier, format_fixed, format_percent};
use crate::context::{
    AgentInfo, AppearanceState, BioState, ConsistencyState, DescentState, DialogueStyleInfo,
    EnvironmentSnapshot, MetaInfo, MindState, PersonaInfo, StateCard,
};

// ============================================================================
// Persona
// ============================================================================

static PERSONA_FIELDS: Lazy<FieldTable<PersonaInfo>> = Lazy::new(|| {
    FieldTable::<PersonaInfo>::builder()
        .field("def_name", |p, _| text(&p.def_name))
        .field("name", |p, _| text(&p.name))
        .field("label", |p, _| text(p.display_label()))
        .field("biography", |p, _| text(&p.biography))
        .field("visual_tags", |p, _| list(&p.visual_tags))
        .field("personality_tags", |p, _| list(&p.personality_tags))
        .field("tone_tags", |p, _| list(&p.tone_tags))
        .field("forbidden_words", |p, _| list(&p.forbidden_words))
        .field("special_abilities", |p, _| list(&p.special_abilities))
        .field("mercy_level", |p, _| Value::from(p.mercy_level))
        .field("chaos_level", |p, _| Value::from(p.chaos_level))
        .field("dominance_level", |p, _| Value::from(p.dominance_level))
        .field("custom_prompt", |p, _| opt_text(p.custom_prompt.as_deref()))
        .build()
});

impl FieldResolver for PersonaInfo {
    const TYPE_NAME: &'static str = "persona";

    fn field_table() -> &'static FieldTable<Self> {
        &PERSONA_FIELDS
    }

    fn normalize_member(folded: &str) -> Option<&'static str> {
        Some(match folded {
            "narratorname" | "displayname" => "name",
            "id" | "defname" => "def_name",
            "bio" | "description" | "background" => "biography",
            "personality" | "traits" => "personality_tags",
            "tone" | "tones" => "tone_tags",
            "visual" | "visualelements" | "appearance" => "visual_tags",
            "forbidden" | "bannedwords" => "forbidden_words",
            "abilities" | "skills" => "special_abilities",
            "mercy" => "mercy_level",
            "chaos" => "chaos_level",
            "dominance" => "dominance_level",
            _ => return None,
        })
    }

    fn computed(&self, category: &str, binding: &Binding) -> Option<Value> {
        match category {
            "disposition" => Some(Value::from(format!(
                "mercy {}, chaos {}, dominance {}",
                format_percent(self.mercy_level),
                format_percent(self.chaos_level),
                format_percent(self.dominance_level)
            ))),
            _ => percent_of(self, category, binding),
        }
    }
}

// ============================================================================
// Agent and dialogue style
// ============================================================================

static AGENT_FIELDS: Lazy<FieldTable<AgentInfo>> = Lazy::new(|| {
    FieldTable::<AgentInfo>::builder()
        .field("affinity", |a, _| Value::from(a.affinity))
        .field("mood", |a, _| text(&a.mood))
        .field("mood_level", |a, _| a.mood_level.map(Value::from).unwrap_or(Value::UNDEFINED))
        .field("active_traits", |a, _| list(&a.active_traits))
        .field("dialogue_style", |a, b| b.bind(a.dialogue_style.clone()))
        .field("habits", |a, _| Value::from(a.dialogue_style.habits()))
        .build()
});

impl FieldResolver for AgentInfo {
    const TYPE_NAME: &'static str = "agent";

    fn field_table() -> &'static FieldTable<Self> {
        &AGENT_FIELDS
    }

    fn normalize_member(folded: &str) -> Option<&'static str> {
        Some(match folded {
            "affinityvalue" | "favorability" | "favor" => "affinity",
            "emotion" | "currentmood" | "currentemotion" => "mood",
            "style" | "dialogstyle" => "dialogue_style",
            "traits" => "active_traits",
            "tier" | "relationship" | "relationshiptier" => "affinity_tier",
            _ => return None,
        })
    }

    fn computed(&self, category: &str, binding: &Binding) -> Option<Value> {
        match category {
            "affinitytier" => Some(Value::from(affinity_tier(self.affinity))),
            "affinitytext" => Some(Value::from(format_fixed(self.affinity, 0))),
            "moodpercent" => self.mood_level.map(|level| Value::from(format_percent(level))),
            _ => percent_of(self, category, binding),
        }
    }
}

static STYLE_FIELDS: Lazy<FieldTable<DialogueStyleInfo>> = Lazy::new(|| {
    FieldTable::<DialogueStyleInfo>::builder()
        .field("formality", |s, _| Value::from(s.formality))
        .field("emotional", |s, _| Value::from(s.emotional))
        .field("verbosity", |s, _| Value::from(s.verbosity))
        .field("humor", |s, _| Value::from(s.humor))
        .field("sarcasm", |s, _| Value::from(s.sarcasm))
        .field("use_emoticons", |s, _| Value::from(s.use_emoticons))
        .field("use_ellipsis", |s, _| Value::from(s.use_ellipsis))
        .field("use_exclamation", |s, _| Value::from(s.use_exclamation))
        .field("habits", |s, _| Value::from(s.habits()))
        .build()
});

impl FieldResolver for DialogueStyleInfo {
    const TYPE_NAME: &'static str = "dialogue_style";

    fn field_table() -> &'static FieldTable<Self> {
        &STYLE_FIELDS
    }

    fn normalize_member(folded: &str) -> Option<&'static str> {
        Some(match folded {
            "formalitylevel" => "formality",
            "emotionalexpression" | "emotion" => "emotional",
            "verbositylevel" | "length" => "verbosity",
            "humorlevel" => "humor",
            "sarcasmlevel" => "sarcasm",
            "emoticons" => "use_emoticons",
            "ellipsis" => "use_ellipsis",
            "exclamation" | "exclamations" => "use_exclamation",
            _ => return None,
        })
    }

    fn computed(&self, category: &str, binding: &Binding) -> Option<Value> {
        percent_of(self, category, binding)
    }
}

// ============================================================================
// Environment
// ============================================================================

static ENVIRONMENT_FIELDS: Lazy<FieldTable<EnvironmentSnapshot>> = Lazy::new(|| {
    FieldTable::<EnvironmentSnapshot>::builder()
        .field("weather", |e, _| opt_text(e.weather()))
        .field("season", |e, _| opt_text(e.season()))
        .field("hour", |e, _| e.hour().map(Value::from).unwrap_or(Value::UNDEFINED))
        .field("day", |e, _| e.day().map(Value::from).unwrap_or(Value::UNDEFINED))
        .field("quadrum", |e, _| opt_text(e.quadrum()))
        .field("year", |e, _| e.year().map(Value::from).unwrap_or(Value::UNDEFINED))
        .field("colonist_count", |e, _| {
            e.colonist_count().map(Value::from).unwrap_or(Value::UNDEFINED)
        })
        .field("temperature", |e, _| e.temperature().map(Value::from).unwrap_or(Value::UNDEFINED))
        .field("threats", |e, _| {
            Value::from(e.threats().into_iter().map(str::to_string).collect::<Vec<_>>())
        })
        .field("is_under_attack", |e, _| Value::from(e.is_under_attack()))
        .field("time_of_day", |e, _| e.time_of_day().map(Value::from).unwrap_or(Value::UNDEFINED))
        .build()
});

impl FieldResolver for EnvironmentSnapshot {
    const TYPE_NAME: &'static str = "environment";

    fn field_table() -> &'static FieldTable<Self> {
        &ENVIRONMENT_FIELDS
    }

    fn normalize_member(folded: &str) -> Option<&'static str> {
        Some(match folded {
            "colonists" | "pawncount" | "population" => "colonist_count",
            "underattack" | "raid" | "threatened" => "is_under_attack",
            "temp" | "outdoortemp" => "temperature",
            "period" => "time_of_day",
            _ => return None,
        })
    }

    fn computed(&self, category: &str, _binding: &Binding) -> Option<Value> {
        if category == "threatcount" {
            return Some(Value::from(self.threats().len()));
        }
        // Free-form keys supplied by the host.
        self.iter()
            .find(|(key, _)| fold_key(key) == category)
            .map(|(_, value)| json(value))
    }
}

// ============================================================================
// Meta
// ============================================================================

static META_FIELDS: Lazy<FieldTable<MetaInfo>> = Lazy::new(|| {
    FieldTable::<MetaInfo>::builder()
        .field("difficulty_mode", |m, _| text(&m.difficulty_mode))
        .field("language_instruction", |m, _| text(&m.language_instruction))
        .field("settings_prompt", |m, _| text(&m.settings_prompt))
        .build()
});

impl FieldResolver for MetaInfo {
    const TYPE_NAME: &'static str = "meta";

    fn field_table() -> &'static FieldTable<Self> {
        &META_FIELDS
    }

    fn normalize_member(folded: &str) -> Option<&'static str> {
        Some(match folded {
            "mode" | "difficulty" => "difficulty_mode",
            "language" | "lang" => "language_instruction",
            "settings" | "modsettingsprompt" => "settings_prompt",
            _ => return None,
        })
    }
}

// ============================================================================
// State card
// ============================================================================

static CARD_FIELDS: Lazy<FieldTable<StateCard>> = Lazy::new(|| {
    FieldTable::<StateCard>::builder()
        .field("name", |c, _| text(&c.name))
        .field("label", |c, _| text(&c.label))
        .field("role", |c, _| text(&c.role))
        .field("bio", |c, b| b.bind(c.bio.clone()))
        .field("mind", |c, b| b.bind(c.mind.clone()))
        .field("appearance", |c, b| b.bind(c.appearance.clone()))
        .field("descent", |c, b| b.bind(c.descent.clone()))
        .build()
});

impl FieldResolver for StateCard {
    const TYPE_NAME: &'static str = "card";

    fn field_table() -> &'static FieldTable<Self> {
        &CARD_FIELDS
    }

    fn normalize_member(folded: &str) -> Option<&'static str> {
        Some(match folded {
            "biorhythm" | "body" => "bio",
            "psycho" | "psyche" | "psychology" => "mind",
            "visual" | "looks" => "appearance",
            "form" => "descent",
            _ => return None,
        })
    }
}

static BIO_FIELDS: Lazy<FieldTable<BioState>> = Lazy::new(|| {
    FieldTable::<BioState>::builder()
        .field("energy_level", |s, _| text(&s.energy_level))
        .field("hunger_level", |s, _| text(&s.hunger_level))
        .field("time_of_day", |s, _| text(&s.time_of_day))
        .field("is_sleepy", |s, _| Value::from(s.is_sleepy))
        .build()
});

impl FieldResolver for BioState {
    const TYPE_NAME: &'static str = "card.bio";

    fn field_table() -> &'static FieldTable<Self> {
        &BIO_FIELDS
    }

    fn normalize_member(folded: &str) -> Option<&'static str> {
        Some(match folded {
            "energy" => "energy_level",
            "hunger" => "hunger_level",
            "sleepy" => "is_sleepy",
            "period" => "time_of_day",
            _ => return None,
        })
    }
}

static MIND_FIELDS: Lazy<FieldTable<MindState>> = Lazy::new(|| {
    FieldTable::<MindState>::builder()
        .field("current_emotion", |s, _| text(&s.current_emotion))
        .field("affinity_tier", |s, _| text(&s.affinity_tier))
        .field("affinity_value", |s, _| Value::from(s.affinity_value))
        .field("active_traits", |s, _| list(&s.active_traits))
        .build()
});

impl FieldResolver for MindState {
    const TYPE_NAME: &'static str = "card.mind";

    fn field_table() -> &'static FieldTable<Self> {
        &MIND_FIELDS
    }

    fn normalize_member(folded: &str) -> Option<&'static str> {
        Some(match folded {
            "emotion" | "mood" => "current_emotion",
            "affinity" => "affinity_value",
            "tier" => "affinity_tier",
            "traits" => "active_traits",
            _ => return None,
        })
    }

    fn computed(&self, category: &str, _binding: &Binding) -> Option<Value> {
        match category {
            "affinitytext" => Some(Value::from(format_fixed(self.affinity_value, 0))),
            _ => None,
        }
    }
}

static APPEARANCE_FIELDS: Lazy<FieldTable<AppearanceState>> = Lazy::new(|| {
    FieldTable::<AppearanceState>::builder()
        .field("has_visual_context", |s, _| Value::from(s.has_visual_context))
        .field("visual_tags", |s, _| list(&s.visual_tags))
        .field("description", |s, _| text(&s.description))
        .field("dominant_color", |s, _| text(&s.dominant_color))
        .field("consistency", |s, b| b.bind(s.consistency.clone()))
        .build()
});

impl FieldResolver for AppearanceState {
    const TYPE_NAME: &'static str = "card.appearance";

    fn field_table() -> &'static FieldTable<Self> {
        &APPEARANCE_FIELDS
    }

    fn normalize_member(folded: &str) -> Option<&'static str> {
        Some(match folded {
            "tags" => "visual_tags",
            "color" => "dominant_color",
            _ => return None,
        })
    }
}

static CONSISTENCY_FIELDS: Lazy<FieldTable<ConsistencyState>> = Lazy::new(|| {
    FieldTable::<ConsistencyState>::builder()
        .field("is_consistent", |s, _| Value::from(s.is_consistent))
        .field("warning_message", |s, _| text(&s.warning_message))
        .field("current_expression", |s, _| text(&s.current_expression))
        .field("expected_expression", |s, _| text(&s.expected_expression))
        .field("severity_level", |s, _| Value::from(s.severity_level))
        .build()
});

impl FieldResolver for ConsistencyState {
    const TYPE_NAME: &'static str = "card.consistency";

    fn field_table() -> &'static FieldTable<Self> {
        &CONSISTENCY_FIELDS
    }

    fn normalize_member(folded: &str) -> Option<&'static str> {
        Some(match folded {
            "consistent" => "is_consistent",
            "warning" => "warning_message",
            "severity" => "severity_level",
            _ => return None,
        })
    }

    fn computed(&self, category: &str, binding: &Binding) -> Option<Value> {
        percent_of(self, category, binding)
    }
}

static DESCENT_FIELDS: Lazy<FieldTable<DescentState>> = Lazy::new(|| {
    FieldTable::<DescentState>::builder()
        .field("is_descending", |s, _| Value::from(s.is_descending))
        .field("is_descent_active", |s, _| Value::from(s.is_descent_active))
        .field("cooldown_remaining", |s, _| text(&s.cooldown_remaining))
        .field("current_form", |s, _| text(&s.current_form))
        .field("form_description", |s, _| text(&s.form_description))
        .build()
});

impl FieldResolver for DescentState {
    const TYPE_NAME: &'static str = "card.descent";

    fn field_table() -> &'static FieldTable<Self> {
        &DESCENT_FIELDS
    }

    fn normalize_member(folded: &str) -> Option<&'static str> {
        Some(match folded {
            "active" => "is_descent_active",
            "descending" => "is_descending",
            "cooldown" => "cooldown_remaining",
            "form" => "current_form",
            _ => return None,
        })
    }
}
