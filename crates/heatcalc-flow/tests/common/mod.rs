#![allow(dead_code)]

use std::sync::Arc;

use heatcalc_flow::Session;
use heatcalc_model::{
    CardConfig, CardField, CardId, CardTemplate, Catalog, CompletionRule, FieldType, FormulaDef,
    RevealCondition, RevealTiming, SessionId, WidgetConfig,
};

pub fn id(value: &str) -> CardId {
    CardId::new(value).unwrap()
}

pub fn form(card_id: &str, order: u32, fields: Vec<CardField>) -> CardTemplate {
    CardTemplate {
        id: id(card_id),
        name: card_id.to_string(),
        display_order: order,
        config: CardConfig::Form {
            fields,
            completion: None,
        },
        reveal_conditions: Vec::new(),
        reveal_timing: Some(RevealTiming::Immediately),
    }
}

pub fn form_with_rule(
    card_id: &str,
    order: u32,
    fields: Vec<CardField>,
    rule: CompletionRule,
) -> CardTemplate {
    let mut card = form(card_id, order, fields);
    card.config = CardConfig::Form {
        fields: card.fields().to_vec(),
        completion: Some(rule),
    };
    card
}

pub fn info(card_id: &str, order: u32, timing: Option<RevealTiming>) -> CardTemplate {
    CardTemplate {
        id: id(card_id),
        name: card_id.to_string(),
        display_order: order,
        config: CardConfig::Info {
            content: format!("About {card_id}"),
        },
        reveal_conditions: Vec::new(),
        reveal_timing: timing,
    }
}

pub fn calculation(
    card_id: &str,
    order: u32,
    calculations: &[&str],
    display: &[&str],
) -> CardTemplate {
    CardTemplate {
        id: id(card_id),
        name: card_id.to_string(),
        display_order: order,
        config: CardConfig::Calculation {
            calculations: calculations.iter().map(|c| c.to_string()).collect(),
            display: display.iter().map(|d| d.to_string()).collect(),
        },
        reveal_conditions: Vec::new(),
        reveal_timing: Some(RevealTiming::Immediately),
    }
}

pub fn submit(card_id: &str, order: u32) -> CardTemplate {
    CardTemplate {
        id: id(card_id),
        name: card_id.to_string(),
        display_order: order,
        config: CardConfig::Submit {
            fields: vec![CardField::new("consent", FieldType::Checkbox).required()],
            button_label: Some("Send".to_string()),
        },
        reveal_conditions: Vec::new(),
        reveal_timing: Some(RevealTiming::Immediately),
    }
}

pub fn with_conditions(mut card: CardTemplate, conditions: Vec<RevealCondition>) -> CardTemplate {
    card.reveal_conditions = conditions;
    card
}

pub fn with_timing(mut card: CardTemplate, timing: Option<RevealTiming>) -> CardTemplate {
    card.reveal_timing = timing;
    card
}

pub fn energy_catalog() -> Catalog {
    Catalog::new()
        .with_formula(FormulaDef::new("energy", "[field:a] + [field:b]").with_unit("kWh"))
        .and_then(|c| c.with_formula(FormulaDef::new("base", "[field:a] * 2")))
        .and_then(|c| c.with_formula(FormulaDef::new("total", "[calc:base] + 1")))
        .and_then(|c| c.with_formula(FormulaDef::new("share", "100 / [field:d]").with_decimals(1)))
        .expect("catalog builds")
}

pub fn session_with(cards: Vec<CardTemplate>, catalog: Catalog, config: WidgetConfig) -> Session {
    Session::new(
        SessionId::new("s-1").unwrap(),
        cards.into(),
        Arc::new(catalog),
        config,
    )
    .expect("session starts")
}

pub fn session(cards: Vec<CardTemplate>) -> Session {
    session_with(cards, energy_catalog(), WidgetConfig::default())
}
