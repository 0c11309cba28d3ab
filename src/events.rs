//! Narrative market events.
//!
//! Each turn has a fixed chance of drawing one event from a small catalog.
//! Events are flavor for the client: the effect tag names what the headline
//! implies, but the simulation parameters themselves are not rewritten.

use rand::Rng;

use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::model::MarketEvent;

struct CatalogEntry {
    name: &'static str,
    effect: &'static str,
    message: &'static str,
}

const CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        name: "Market Boom",
        effect: "drift_boost",
        message: "Breaking: A market-wide boom boosts investor confidence!",
    },
    CatalogEntry {
        name: "Tech Bubble Bursts",
        effect: "tech_vol_spike",
        message: "Breaking: The AI & Tech bubble has burst, causing massive volatility in tech stocks!",
    },
    CatalogEntry {
        name: "Fed Rate Hikes",
        effect: "market_drift_down",
        message: "Breaking: The Fed unexpectedly hikes interest rates, slowing market growth.",
    },
    CatalogEntry {
        name: "Recession Fears",
        effect: "market_vol_spike",
        message: "Breaking: Recession fears grip the market, increasing volatility across all assets.",
    },
];

pub struct EventInjector {
    probability: f64,
}

impl EventInjector {
    pub fn new(probability: f64) -> Self {
        Self { probability: probability.clamp(0.0, 1.0) }
    }

    /// Rolls once for this turn: `None` most of the time, otherwise a
    /// uniformly chosen event from the catalog.
    pub fn roll<R: Rng>(&self, rng: &mut R) -> Option<MarketEvent> {
        if rng.gen::<f64>() >= self.probability {
            return None;
        }
        let entry = &CATALOG[rng.gen_range(0..CATALOG.len())];
        let event = MarketEvent {
            name: entry.name.to_string(),
            effect: entry.effect.to_string(),
            message: entry.message.to_string(),
        };
        log(
            Level::Info,
            Domain::Event,
            "market_event",
            obj(&[
                ("name", v_str(&event.name)),
                ("effect", v_str(&event.effect)),
                ("probability", v_num(self.probability)),
            ]),
        );
        Some(event)
    }
}
