//! Live-tail and list modes

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How the archive follows new data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiveUpdate {
    /// Browse history; no feed
    Offline,
    /// Follow new items of the scan being viewed
    Scan,
    /// Follow every new item
    Always,
}

impl LiveUpdate {
    pub fn as_str(&self) -> &'static str {
        match self {
            LiveUpdate::Offline => "offline",
            LiveUpdate::Scan => "scan",
            LiveUpdate::Always => "always",
        }
    }

    /// Next mode of the `auto` cycle; no mode yet counts as offline
    ///
    /// ```text
    /// offline -> scan -> always -> offline
    /// ```
    pub fn cycle(current: Option<LiveUpdate>) -> LiveUpdate {
        match current {
            None | Some(LiveUpdate::Offline) => LiveUpdate::Scan,
            Some(LiveUpdate::Scan) => LiveUpdate::Always,
            Some(LiveUpdate::Always) => LiveUpdate::Offline,
        }
    }
}

impl fmt::Display for LiveUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mode requested through `toggle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateRequest {
    Offline,
    Scan,
    Always,
    /// Advance one step of [`LiveUpdate::cycle`]
    Auto,
}

impl UpdateRequest {
    /// Mode that results from applying this request to `current`
    pub fn resolve(&self, current: Option<LiveUpdate>) -> LiveUpdate {
        match self {
            UpdateRequest::Offline => LiveUpdate::Offline,
            UpdateRequest::Scan => LiveUpdate::Scan,
            UpdateRequest::Always => LiveUpdate::Always,
            UpdateRequest::Auto => LiveUpdate::cycle(current),
        }
    }
}

impl From<LiveUpdate> for UpdateRequest {
    fn from(mode: LiveUpdate) -> Self {
        match mode {
            LiveUpdate::Offline => UpdateRequest::Offline,
            LiveUpdate::Scan => UpdateRequest::Scan,
            LiveUpdate::Always => UpdateRequest::Always,
        }
    }
}

impl FromStr for UpdateRequest {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offline" => Ok(UpdateRequest::Offline),
            "scan" => Ok(UpdateRequest::Scan),
            "always" => Ok(UpdateRequest::Always),
            "auto" => Ok(UpdateRequest::Auto),
            other => Err(format!("unknown update mode: {other}")),
        }
    }
}

/// Why the item list last changed; decides how the visible window moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListMode {
    /// A fresh hour was requested
    #[default]
    Select,
    /// The previous hour was added in front
    Prepend,
    /// The next hour was added at the end
    Append,
    /// Jumped to the latest data
    Catchup,
    /// Only the selection moved
    Navigate,
}
