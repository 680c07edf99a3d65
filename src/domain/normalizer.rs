//! Message normalizer: many wire shapes, one canonical update.
//!
//! The upstream stream has shipped several shapes for the same data over
//! time. Each known shape is a pure matcher `&Value -> Option<update>`;
//! matchers are tried in declared order and the first one that
//! recognizes the frame wins. Frames nobody recognizes are dropped.
//!
//! Control frames (connected, heartbeat, acks, errors) are matched
//! before any market data shape.

use serde_json::{Map, Value};

use super::market::{parse_probability, probability, EventUpdate, MarketId, PriceUpdate};

/// Connection-level signals carried in-band by the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlSignal {
    /// Server confirmed the session.
    Connected,
    /// Server is about to drop the session.
    Disconnected,
    /// Keep-alive; never forwarded to consumers.
    Heartbeat,
    /// Server-side error message.
    Error(String),
    /// Subscription acknowledged for these markets.
    Subscribed(Vec<MarketId>),
}

/// Market data extracted from one frame.
///
/// Carries a price part, an event part, or both.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketUpdate {
    /// Market the update belongs to.
    pub market_id: MarketId,
    /// Prices, if the frame carried any valid price.
    pub price: Option<PriceUpdate>,
    /// Event state, if the frame carried any.
    pub event: Option<EventUpdate>,
}

/// Canonical output of the normalizer.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedUpdate {
    /// In-band control signal.
    Control(ControlSignal),
    /// Price and/or event data for one market.
    Market(MarketUpdate),
}

/// A shape matcher.
pub type Matcher = fn(&Value) -> Option<NormalizedUpdate>;

/// Why a frame could not be decoded at all.
#[derive(Debug, thiserror::Error)]
#[error("frame is not valid JSON: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// Ordered dispatch table of shape matchers.
#[derive(Clone)]
pub struct MessageNormalizer {
    matchers: Vec<(&'static str, Matcher)>,
}

impl Default for MessageNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MessageNormalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageNormalizer")
            .field("matchers", &self.matcher_names())
            .finish()
    }
}

impl MessageNormalizer {
    /// Normalizer with every known shape, control frames first.
    pub fn new() -> Self {
        Self {
            matchers: vec![
                ("control", match_control as Matcher),
                ("market_data_lite", match_market_data as Matcher),
                ("sides_map", match_sides_map as Matcher),
                ("outcome_array", match_outcome_array as Matcher),
                ("event_state", match_event_state as Matcher),
                ("legacy_fields", match_legacy as Matcher),
            ],
        }
    }

    /// Normalizer with a custom table.
    pub fn with_matchers(matchers: Vec<(&'static str, Matcher)>) -> Self {
        Self { matchers }
    }

    /// Names of the matchers in dispatch order.
    pub fn matcher_names(&self) -> Vec<&'static str> {
        self.matchers.iter().map(|(name, _)| *name).collect()
    }

    /// Decode a raw text frame.
    ///
    /// `Err` only for frames that are not JSON; `Ok(None)` for JSON that
    /// no matcher recognizes.
    pub fn decode(&self, raw: &str) -> Result<Option<NormalizedUpdate>, DecodeError> {
        let value: Value = serde_json::from_str(raw)?;
        Ok(self.normalize_value(&value))
    }

    /// Decode a raw text frame, dropping anything unrecognized.
    pub fn normalize(&self, raw: &str) -> Option<NormalizedUpdate> {
        self.decode(raw).ok().flatten()
    }

    /// Run the dispatch table over an already parsed frame.
    pub fn normalize_value(&self, value: &Value) -> Option<NormalizedUpdate> {
        self.matchers.iter().find_map(|(_, matcher)| matcher(value))
    }
}

// ── Field helpers ───────────────────────────────────────────

const MARKET_ID_KEYS: &[&str] = &["marketSlug", "marketId", "market_slug", "slug", "market"];

/// Parse a price from a number, a numeric string, or a `{value}` wrapper.
fn px(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().and_then(probability),
        Value::String(s) => parse_probability(s),
        Value::Object(map) => ["value", "px", "price"]
            .iter()
            .find_map(|k| map.get(*k))
            .and_then(px),
        _ => None,
    }
}

fn first_px(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().filter_map(|k| obj.get(*k)).find_map(px)
}

fn market_id(obj: &Map<String, Value>) -> Option<MarketId> {
    MARKET_ID_KEYS
        .iter()
        .filter_map(|k| obj.get(*k))
        .find_map(|v| v.as_str().filter(|s| !s.is_empty()))
        .map(str::to_string)
}

fn string_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().filter_map(|k| obj.get(*k)).find_map(|v| match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn bool_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<bool> {
    keys.iter().filter_map(|k| obj.get(*k)).find_map(Value::as_bool)
}

/// Score as `"H - A"`, from a string or a `{home, away}` object.
fn score(obj: &Map<String, Value>) -> Option<String> {
    match obj.get("score")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(parts) => {
            let home = parts.get("home").or_else(|| parts.get("homeScore"))?;
            let away = parts.get("away").or_else(|| parts.get("awayScore"))?;
            Some(format!("{} - {}", scalar(home)?, scalar(away)?))
        }
        _ => None,
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Event state from an object, if it carries any event field.
fn event_from(obj: &Map<String, Value>, market_id: &str) -> Option<EventUpdate> {
    let status = string_field(obj, &["status", "state"]).map(|s| s.to_ascii_lowercase());
    let score = score(obj);
    let period = string_field(obj, &["period", "quarter", "half"]);
    let elapsed = string_field(obj, &["elapsed", "clock", "gameClock"]);
    let live = bool_field(obj, &["live", "isLive"]);
    let ended = bool_field(obj, &["ended", "isEnded", "final"]);

    if score.is_none()
        && period.is_none()
        && elapsed.is_none()
        && live.is_none()
        && ended.is_none()
        && status.is_none()
    {
        return None;
    }

    let status_live = status
        .as_deref()
        .is_some_and(|s| matches!(s, "live" | "in_progress" | "inprogress"));
    let status_ended = status
        .as_deref()
        .is_some_and(|s| matches!(s, "ended" | "final" | "finished" | "closed"));

    Some(EventUpdate {
        market_id: market_id.to_string(),
        score,
        period,
        elapsed,
        live: live.unwrap_or(status_live),
        ended: ended.unwrap_or(status_ended),
    })
}

/// `[{name, price}]` entries into the side map, skipping invalid prices.
fn outcome_prices(entries: &[Value], update: &mut PriceUpdate) {
    for entry in entries {
        let Some(obj) = entry.as_object() else {
            continue;
        };
        let Some(name) = string_field(obj, &["name", "side", "outcome", "title"]) else {
            continue;
        };
        if let Some(price) = first_px(obj, &["price", "px", "currentPx", "value"]) {
            update.side_prices.insert(name, price);
        }
    }
}

fn aggregate_prices(obj: &Map<String, Value>, update: &mut PriceUpdate) {
    update.current_px = first_px(obj, &["currentPx", "current_px"]);
    update.last_trade_px = first_px(obj, &["lastTradePx", "last_trade_px", "lastTradePrice"]);
    update.settlement_px = first_px(obj, &["settlementPx", "settlement_px"]);
}

fn market_update(
    market_id: MarketId,
    price: PriceUpdate,
    event: Option<EventUpdate>,
) -> Option<NormalizedUpdate> {
    let price = (!price.is_empty()).then(|| price.with_inference());
    if price.is_none() && event.is_none() {
        return None;
    }
    Some(NormalizedUpdate::Market(MarketUpdate {
        market_id,
        price,
        event,
    }))
}

// ── Matchers (declared order) ───────────────────────────────

/// `{"type": "heartbeat"}`, `{"event": "subscribed", ...}`, `{"heartbeat": {}}`.
fn match_control(value: &Value) -> Option<NormalizedUpdate> {
    let obj = value.as_object()?;

    if obj.contains_key("heartbeat") && market_id(obj).is_none() {
        return Some(NormalizedUpdate::Control(ControlSignal::Heartbeat));
    }

    let kind = ["type", "event", "status"]
        .iter()
        .filter_map(|k| obj.get(*k))
        .find_map(Value::as_str)?
        .to_ascii_lowercase();

    let signal = match kind.as_str() {
        "connected" | "connection_ack" | "welcome" => ControlSignal::Connected,
        "disconnected" | "closing" => ControlSignal::Disconnected,
        "heartbeat" | "ping" | "pong" | "keepalive" | "keep_alive" => ControlSignal::Heartbeat,
        "error" => ControlSignal::Error(
            string_field(obj, &["message", "error", "reason"])
                .unwrap_or_else(|| "unknown stream error".to_string()),
        ),
        "subscribed" | "subscription_ack" | "ack" => {
            let markets = obj
                .get("marketIds")
                .or_else(|| obj.get("marketSlugs"))
                .and_then(Value::as_array)
                .map(|ids| {
                    ids.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            ControlSignal::Subscribed(markets)
        }
        _ => return None,
    };

    Some(NormalizedUpdate::Control(signal))
}

/// `{"marketDataLite": {marketSlug, currentPx, outcomes?, gameState?}}`
/// and the full `{"marketData": {...}}` variant.
fn match_market_data(value: &Value) -> Option<NormalizedUpdate> {
    let obj = value.as_object()?;
    let inner = obj
        .get("marketDataLite")
        .or_else(|| obj.get("marketData"))?
        .as_object()?;
    let id = market_id(inner).or_else(|| market_id(obj))?;

    let mut price = PriceUpdate::new(id.clone());
    aggregate_prices(inner, &mut price);
    if let Some(outcomes) = inner
        .get("outcomes")
        .or_else(|| inner.get("outcomePrices"))
        .and_then(Value::as_array)
    {
        outcome_prices(outcomes, &mut price);
    }

    let event = inner
        .get("gameState")
        .or_else(|| inner.get("eventState"))
        .and_then(Value::as_object)
        .and_then(|state| event_from(state, &id));

    market_update(id, price, event)
}

/// `{marketId, sides: {"Lakers": 0.61, "Celtics": "0.39"}}`.
fn match_sides_map(value: &Value) -> Option<NormalizedUpdate> {
    let obj = value.as_object()?;
    let sides = obj.get("sides")?.as_object()?;
    let id = market_id(obj)?;

    let mut price = PriceUpdate::new(id.clone());
    aggregate_prices(obj, &mut price);
    for (name, raw) in sides {
        if let Some(p) = px(raw) {
            price.side_prices.insert(name.clone(), p);
        }
    }

    let event = event_from(obj, &id);
    market_update(id, price, event)
}

/// `{marketId, prices: [{name, price}, ...]}`.
fn match_outcome_array(value: &Value) -> Option<NormalizedUpdate> {
    let obj = value.as_object()?;
    let entries = obj
        .get("prices")
        .or_else(|| obj.get("outcomes"))?
        .as_array()?;
    let id = market_id(obj)?;

    let mut price = PriceUpdate::new(id.clone());
    aggregate_prices(obj, &mut price);
    outcome_prices(entries, &mut price);

    market_update(id, price, None)
}

/// `{"eventState": {marketSlug, score, period, elapsed, live, ended}}`.
fn match_event_state(value: &Value) -> Option<NormalizedUpdate> {
    let obj = value.as_object()?;
    let inner = obj
        .get("eventState")
        .or_else(|| obj.get("gameState"))?
        .as_object()?;
    let id = market_id(inner).or_else(|| market_id(obj))?;
    let event = event_from(inner, &id)?;
    Some(NormalizedUpdate::Market(MarketUpdate {
        market_id: id,
        price: None,
        event: Some(event),
    }))
}

/// `{slug, price}` / `{market_slug, last_price, score}` and friends.
fn match_legacy(value: &Value) -> Option<NormalizedUpdate> {
    let obj = value.as_object()?;
    let id = market_id(obj)?;

    let mut price = PriceUpdate::new(id.clone());
    price.current_px = first_px(obj, &["currentPx", "price", "px", "last_price", "mid"]);
    price.last_trade_px = first_px(obj, &["lastTradePx", "last_trade_price"]);
    price.settlement_px = first_px(obj, &["settlementPx", "settlement_price"]);

    let event = event_from(obj, &id);
    market_update(id, price, event)
}
