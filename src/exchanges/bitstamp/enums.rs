use serde::{Deserialize, Serialize};
use std::fmt;

/// Order book grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Group {
    /// Orders are not grouped
    Zero,
    /// Orders grouped by price
    #[default]
    One,
    /// Orders with their order ids
    Two,
}

impl Group {
    pub fn as_param(self) -> &'static str {
        match self {
            Self::Zero => "0",
            Self::One => "1",
            Self::Two => "2",
        }
    }
}

/// Lookback window for the public transactions endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Time {
    Minute,
    #[default]
    Hour,
    Day,
}

impl Time {
    pub fn as_param(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }
}

/// OHLC timeframe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    OneMinute,
    ThreeMinutes,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    TwoHours,
    FourHours,
    SixHours,
    TwelveHours,
    OneDay,
    ThreeDays,
}

impl Step {
    /// Timeframe length in seconds, as the API expects it
    pub fn seconds(self) -> u32 {
        match self {
            Self::OneMinute => 60,
            Self::ThreeMinutes => 180,
            Self::FiveMinutes => 300,
            Self::FifteenMinutes => 900,
            Self::ThirtyMinutes => 1_800,
            Self::OneHour => 3_600,
            Self::TwoHours => 7_200,
            Self::FourHours => 14_400,
            Self::SixHours => 21_600,
            Self::TwelveHours => 43_200,
            Self::OneDay => 86_400,
            Self::ThreeDays => 259_200,
        }
    }
}

/// Result ordering for user transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sort {
    Asc,
    #[default]
    Desc,
}

impl Sort {
    pub fn as_param(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// WebSocket event tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    #[serde(rename = "bts:subscribe")]
    Subscribe,
    #[serde(rename = "bts:unsubscribe")]
    Unsubscribe,
    #[serde(rename = "bts:subscription_succeeded")]
    SubscriptionSucceeded,
    #[serde(rename = "bts:unsubscription_succeeded")]
    UnsubscriptionSucceeded,
    #[serde(rename = "bts:heartbeat")]
    Heartbeat,
    #[serde(rename = "bts:request_reconnect")]
    RequestReconnect,
    #[serde(rename = "bts:error")]
    Error,
}

impl Event {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Subscribe => "bts:subscribe",
            Self::Unsubscribe => "bts:unsubscribe",
            Self::SubscriptionSucceeded => "bts:subscription_succeeded",
            Self::UnsubscriptionSucceeded => "bts:unsubscription_succeeded",
            Self::Heartbeat => "bts:heartbeat",
            Self::RequestReconnect => "bts:request_reconnect",
            Self::Error => "bts:error",
        }
    }

    /// Control event for a tag, `None` for data events such as `trade`
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "bts:subscribe" => Some(Self::Subscribe),
            "bts:unsubscribe" => Some(Self::Unsubscribe),
            "bts:subscription_succeeded" => Some(Self::SubscriptionSucceeded),
            "bts:unsubscription_succeeded" => Some(Self::UnsubscriptionSucceeded),
            "bts:heartbeat" => Some(Self::Heartbeat),
            "bts:request_reconnect" => Some(Self::RequestReconnect),
            "bts:error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status reported in a heartbeat acknowledgement
pub const HEARTBEAT_SUCCESS: &str = "success";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tags_round_trip_through_serde() {
        let json = serde_json::to_string(&Event::RequestReconnect).unwrap();
        assert_eq!(json, "\"bts:request_reconnect\"");
        assert_eq!(Event::from_tag("bts:heartbeat"), Some(Event::Heartbeat));
        assert_eq!(Event::from_tag("trade"), None);
    }

    #[test]
    fn test_request_parameter_values() {
        assert_eq!(Group::default().as_param(), "1");
        assert_eq!(Time::default().as_param(), "hour");
        assert_eq!(Sort::default().as_param(), "desc");
        assert_eq!(Step::ThreeDays.seconds(), 259_200);
        assert_eq!(Step::FifteenMinutes.seconds(), 900);
    }
}
