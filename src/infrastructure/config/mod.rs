//! Configuration management
//!
//! Settings come from a YAML file, with environment variables (including a
//! `.env` file) taking precedence. Malformed optional values are logged and
//! skipped rather than crashing the bot.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::application::errors::ConfigError;

/// Channel scanned by default when no scan channels are configured.
const DEFAULT_SCAN_CHANNEL_ID: u64 = 1350853422064336969;
/// Fallback target for active-player relays when nothing else is configured.
const DEFAULT_ACTIVE_PLAYERS_CHANNEL_ID: u64 = 1459232504711217213;

/// Bot configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub discord: DiscordConfig,
    pub links: LinksConfig,
    pub moderation: ModerationConfig,
    pub llm: LlmConfig,
    pub memory: MemoryConfig,
    pub web: WebConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DiscordConfig {
    pub token: Option<String>,
    pub guild_id: Option<u64>,
    pub welcome_channel_id: Option<u64>,
    pub mod_log_channel_id: Option<u64>,
    pub escalation_channel_id: Option<u64>,
    pub active_players_channel_id: Option<u64>,
    pub staff_role_id: Option<u64>,
    pub event_ping_role_id: Option<u64>,
}

/// Community links surfaced by templates and slash commands
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct LinksConfig {
    pub rules: Option<String>,
    pub group: Option<String>,
    pub support: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModerationConfig {
    pub scan_channel_ids: Vec<u64>,
    pub scan_keywords: Vec<String>,
    /// Regex sources, compiled case-insensitively at startup. Invalid
    /// entries are skipped with a warning.
    pub blocked_patterns: Vec<String>,
    pub scan_interval_seconds: u64,
    pub warn_threshold: i32,
    pub delete_threshold: i32,
    pub escalate_threshold: i32,
    /// Extra risk score per channel id, for channels that attract trouble.
    pub channel_risk_scores: HashMap<String, i32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct LlmConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
    pub debug: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct MemoryConfig {
    pub path: PathBuf,
    pub retention_days: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct WebConfig {
    pub port: u16,
    pub token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord: DiscordConfig {
                token: None,
                guild_id: None,
                welcome_channel_id: None,
                mod_log_channel_id: None,
                escalation_channel_id: None,
                active_players_channel_id: None,
                staff_role_id: None,
                event_ping_role_id: None,
            },
            links: LinksConfig {
                rules: None,
                group: None,
                support: None,
            },
            moderation: ModerationConfig {
                scan_channel_ids: vec![DEFAULT_SCAN_CHANNEL_ID],
                scan_keywords: default_keywords(),
                blocked_patterns: default_blocked_patterns(),
                scan_interval_seconds: 5,
                warn_threshold: 20,
                delete_threshold: 45,
                escalate_threshold: 80,
                channel_risk_scores: HashMap::new(),
            },
            llm: LlmConfig {
                enabled: false,
                endpoint: None,
                debug: false,
            },
            memory: MemoryConfig {
                path: PathBuf::from("data/word-memory.jsonl"),
                retention_days: 30,
            },
            web: WebConfig {
                port: 8123,
                token: None,
            },
        }
    }
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config: {}", e)))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))?;
        config.normalize();
        Ok(config)
    }

    /// Builds a config from defaults plus environment overrides.
    pub fn load_env() -> Self {
        let mut config = Config::default();
        config.apply_env();
        config
    }

    pub fn save(&self, path: impl Into<PathBuf>) -> Result<(), ConfigError> {
        let path = path.into();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::Parse(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(&path, content)
            .map_err(|e| ConfigError::Parse(format!("Failed to write config: {}", e)))
    }

    /// Applies environment variables on top of the current values.
    pub fn apply_env(&mut self) {
        if let Some(token) = env_string("DISCORD_TOKEN") {
            self.discord.token = Some(token);
        }
        apply_env_id("GUILD_ID", &mut self.discord.guild_id);
        apply_env_id("WELCOME_CHANNEL_ID", &mut self.discord.welcome_channel_id);
        apply_env_id("MOD_LOG_CHANNEL_ID", &mut self.discord.mod_log_channel_id);
        apply_env_id(
            "MOD_ESCALATION_CHANNEL_ID",
            &mut self.discord.escalation_channel_id,
        );
        apply_env_id(
            "ACTIVE_PLAYERS_CHANNEL_ID",
            &mut self.discord.active_players_channel_id,
        );
        apply_env_id("STAFF_ROLE_ID", &mut self.discord.staff_role_id);
        apply_env_id("EVENT_PING_ROLE_ID", &mut self.discord.event_ping_role_id);

        if let Some(link) = env_string("RULES_LINK") {
            self.links.rules = Some(link);
        }
        if let Some(link) = env_string("GROUP_LINK") {
            self.links.group = Some(link);
        }
        if let Some(link) = env_string("SUPPORT_LINK") {
            self.links.support = Some(link);
        }

        if let Some(ids) = env_string("MOD_SCAN_CHANNEL_IDS") {
            let parsed = parse_id_list(&ids);
            if !parsed.is_empty() {
                self.moderation.scan_channel_ids = parsed;
            }
        }
        if let Some(keywords) = env_string("MOD_SCAN_KEYWORDS") {
            let parsed = parse_csv(&keywords);
            if !parsed.is_empty() {
                self.moderation.scan_keywords = parsed;
            }
        }
        if let Some(patterns) = env_string("MOD_BLOCKED_PATTERNS") {
            let parsed = parse_csv(&patterns);
            if !parsed.is_empty() {
                self.moderation.blocked_patterns = parsed;
            }
        }
        if let Some(value) = env_string("MOD_SCAN_INTERVAL_SECONDS") {
            if let Ok(seconds) = value.parse::<u64>() {
                self.moderation.scan_interval_seconds = seconds;
            } else {
                warn!("Ignoring invalid MOD_SCAN_INTERVAL_SECONDS: {}", value);
            }
        }
        apply_env_score("MOD_WARN_THRESHOLD", &mut self.moderation.warn_threshold);
        apply_env_score("MOD_DELETE_THRESHOLD", &mut self.moderation.delete_threshold);
        apply_env_score(
            "MOD_ESCALATE_THRESHOLD",
            &mut self.moderation.escalate_threshold,
        );
        if let Some(value) = env_string("MOD_CHANNEL_RISK_SCORES") {
            let parsed = parse_score_map(&value);
            if !parsed.is_empty() {
                self.moderation.channel_risk_scores = parsed;
            }
        }

        if let Some(value) = env_string("LLM_CLASSIFICATION_ENABLED") {
            self.llm.enabled = parse_bool(&value);
        }
        if let Some(url) = env_string("LLM_ENDPOINT_URL") {
            self.llm.endpoint = Some(url);
        }
        if let Some(value) = env_string("LLM_DEBUG_ENABLED") {
            self.llm.debug = parse_bool(&value);
        }

        if let Some(path) = env_string("WORD_MEMORY_PATH") {
            self.memory.path = PathBuf::from(path);
        }

        if let Some(value) = env_string("ACTIVE_PLAYERS_WEB_PORT") {
            match value.parse::<u16>() {
                Ok(port) if port >= 1 => self.web.port = port,
                _ => warn!("Ignoring invalid ACTIVE_PLAYERS_WEB_PORT: {}", value),
            }
        }
        if let Some(token) = env_string("ACTIVE_PLAYERS_WEB_TOKEN") {
            self.web.token = Some(token);
        }

        self.normalize();
    }

    /// Clamps values into their valid ranges and fills derived fallbacks.
    fn normalize(&mut self) {
        if self.moderation.scan_interval_seconds < 5 {
            self.moderation.scan_interval_seconds = 5;
        }
        if self.moderation.scan_channel_ids.is_empty() {
            self.moderation.scan_channel_ids = vec![DEFAULT_SCAN_CHANNEL_ID];
        }
        self.moderation.scan_channel_ids.sort_unstable();
        self.moderation.scan_channel_ids.dedup();
        if self.moderation.scan_keywords.is_empty() {
            self.moderation.scan_keywords = default_keywords();
        }
        if self.moderation.blocked_patterns.is_empty() {
            self.moderation.blocked_patterns = default_blocked_patterns();
        }
        if self.discord.active_players_channel_id.is_none() {
            self.discord.active_players_channel_id = self
                .discord
                .mod_log_channel_id
                .or(Some(DEFAULT_ACTIVE_PLAYERS_CHANNEL_ID));
        }
        if self.discord.escalation_channel_id.is_none() {
            self.discord.escalation_channel_id = self.discord.mod_log_channel_id;
        }
    }

    /// The token is the only hard requirement; everything else degrades.
    pub fn require_token(&self) -> Result<&str, ConfigError> {
        self.discord
            .token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                ConfigError::MissingField("DISCORD_TOKEN must be set in the environment".into())
            })
    }

    /// Extra risk score for a channel, 0 when none is configured.
    pub fn channel_risk_score(&self, channel_id: &str) -> i32 {
        self.moderation
            .channel_risk_scores
            .get(channel_id)
            .copied()
            .unwrap_or(0)
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn apply_env_id(key: &str, slot: &mut Option<u64>) {
    if let Some(value) = env_string(key) {
        match value.parse::<u64>() {
            Ok(id) => *slot = Some(id),
            Err(_) => warn!("Ignoring invalid {}: {}", key, value),
        }
    }
}

fn apply_env_score(key: &str, slot: &mut i32) {
    if let Some(value) = env_string(key) {
        match value.parse::<i32>() {
            Ok(score) => *slot = score,
            Err(_) => warn!("Ignoring invalid {}: {}", key, value),
        }
    }
}

fn parse_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_id_list(value: &str) -> Vec<u64> {
    parse_csv(value)
        .into_iter()
        .filter_map(|entry| match entry.parse::<u64>() {
            Ok(id) => Some(id),
            Err(_) => {
                warn!("Ignoring invalid channel id: {}", entry);
                None
            }
        })
        .collect()
}

/// Parses `channel-id:score` pairs separated by commas.
fn parse_score_map(value: &str) -> HashMap<String, i32> {
    let mut scores = HashMap::new();
    for entry in parse_csv(value) {
        let Some((id, score)) = entry.split_once(':') else {
            warn!("Ignoring malformed channel risk entry: {}", entry);
            continue;
        };
        match score.trim().parse::<i32>() {
            Ok(score) => {
                scores.insert(id.trim().to_string(), score);
            }
            Err(_) => warn!("Ignoring malformed channel risk entry: {}", entry),
        }
    }
    scores
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn default_keywords() -> Vec<String> {
    [
        // Harassment and threats
        "harass",
        "harassment",
        "threat",
        "threaten",
        "threatening",
        "intimidate",
        "intimidation",
        "bully",
        "bullying",
        "abuse",
        "abusive",
        "stalk",
        "stalking",
        "blackmail",
        "extort",
        "extortion",
        "coerce",
        "coercion",
        // Doxxing and privacy violations
        "dox",
        "doxx",
        "doxxed",
        "doxxing",
        "leak",
        "leaks",
        "leaked",
        "expose",
        "exposed",
        "ip",
        "ip address",
        "ipv4",
        "ipv6",
        "home address",
        "house address",
        "real address",
        "phone number",
        "phone #",
        "mobile number",
        "email address",
        "private info",
        "personal info",
        "personal information",
        "ssn",
        "social security",
        "passport",
        "driver license",
        "credit card",
        "debit card",
        // Hate speech and extremism
        "hate",
        "hateful",
        "slur",
        "slurs",
        "racist",
        "racism",
        "bigot",
        "bigotry",
        "nazi",
        "neo nazi",
        "fascist",
        "white power",
        "kkk",
        "genocide",
        "ethnic cleansing",
        "supremacy",
        "hate crime",
        // Self-harm and suicide baiting
        "kys",
        "kill yourself",
        "kill urself",
        "go kill yourself",
        "go die",
        "you should die",
        "end your life",
        "unalive yourself",
        "suicide bait",
        "self harm",
        "self-harm",
        "commit suicide",
        // Sexual abuse and exploitation
        "rape",
        "raped",
        "rapist",
        "sexual assault",
        "sexual abuse",
        "molest",
        "molestation",
        "pedo",
        "pedophile",
        "pedophilia",
        "groom",
        "groomer",
        "grooming",
        "child porn",
        "child pornography",
        "cp",
        "minor sexual",
        "underage sex",
        // Violence and physical harm
        "kill",
        "murder",
        "execute",
        "beat",
        "assault",
        "shoot",
        "shooting",
        "stab",
        "stabbing",
        "bomb",
        "bombing",
        "terrorist",
        "terrorism",
        "massacre",
        "death threat",
        // Cybercrime and attacks
        "ddos",
        "dos attack",
        "crash server",
        "server crash",
        "hack",
        "hacking",
        "exploit",
        "exploiting",
        "breach",
        "data breach",
        "malware",
        "virus",
        "trojan",
        "rat",
        "keylogger",
        "phishing",
        "scam",
        "fraud",
        // Scams and social engineering
        "free nitro",
        "free discord nitro",
        "steam gift",
        "steam giveaway",
        "crypto scam",
        "investment scam",
        "fake giveaway",
        "airdrop scam",
        "impersonation",
        "account recovery scam",
        // Spam and malicious behavior
        "join my server",
        "click this link",
        "limited time offer",
        "act now",
        "dm me for info",
        "dm for details",
        "too good to be true",
        // Illegal content
        "illegal drugs",
        "sell drugs",
        "buy drugs",
        "cocaine",
        "heroin",
        "meth",
        "fentanyl",
        "weapons sale",
        "gun for sale",
        "unregistered weapon",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_blocked_patterns() -> Vec<String> {
    [
        // Links and URL obfuscation
        r"http[s]?://",
        r"www\.",
        r"\b[a-z0-9.-]+\.(com|net|org|io|ru|cn|tk|xyz|top|gg)\b",
        r"h\s*t\s*t\s*p",
        r"dot\s*(com|net|org|gg)",
        // Discord invites
        r"discord(\.|\s)*(gg|com)(/|\s)*(invite)?",
        r"d\s*i\s*s\s*c\s*o\s*r\s*d",
        r"join\s+my\s+(discord|server)",
        r"invite\s+link",
        // Scams and giveaways
        r"free\s*nitro",
        r"nitro\s*generator",
        r"steam\s*(gift|giveaway|code)",
        r"crypto\s*(giveaway|airdrop)",
        r"wallet\s*connect",
        r"double\s*your\s*(crypto|btc|eth)",
        r"investment\s*guaranteed",
        r"risk\s*free\s*profit",
        // Phishing and token grabbers
        r"verify\s+your\s+account",
        r"account\s+disabled",
        r"suspicious\s+activity",
        r"login\s+to\s+continue",
        r"reset\s+your\s+password",
        r"token\s*grab",
        r"grab\s*token",
        // Malware and exploits
        r"\.exe\b",
        r"\.jar\b",
        r"\.bat\b",
        r"powershell",
        r"cmd\.exe",
        r"keylogger",
        r"rat\s*tool",
        r"remote\s*access\s*tool",
        // Doxxing and data leak formats
        r"\b\d{1,3}(\.\d{1,3}){3}\b",
        r"\b(?:[0-9a-f]{1,4}:){2,}[0-9a-f]{1,4}\b",
        r"\b\d{3}-\d{2}-\d{4}\b",
        r"\b\d{16}\b",
        r"\b\d{10,15}\b",
        // Evasion and obfuscation
        r"\b(?:[a-z]\s+){5,}[a-z]\b",
        r"[a-zA-Z0-9]{30,}",
        r"zero\s*width",
        // Raid and spam behavior
        r"@everyone\b",
        r"@here\b",
        r"raid\s*(this|now)",
        r"spam\s*(this|chat)",
        // Social engineering
        r"dm\s*me",
        r"private\s*message\s*me",
        r"add\s*me\s*back",
        r"trust\s*me",
        // File sharing mirrors
        r"mega\.nz",
        r"mediafire",
        r"dropbox",
        r"pastebin",
        r"anonfiles",
        // Clear bypass attempts
        r"bypass",
        r"filter\s*evasion",
        r"anti\s*ban",
        r"undetectable",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_moderation_defaults() {
        let config = Config::default();
        assert!(config
            .moderation
            .scan_keywords
            .iter()
            .any(|k| k == "harass"));
        assert!(!config.moderation.blocked_patterns.is_empty());
        assert_eq!(config.moderation.scan_interval_seconds, 5);
        assert_eq!(config.web.port, 8123);
    }

    #[test]
    fn normalize_clamps_interval_and_fills_relay_channel() {
        let mut config = Config::default();
        config.moderation.scan_interval_seconds = 1;
        config.discord.mod_log_channel_id = Some(42);
        config.discord.active_players_channel_id = None;
        config.normalize();
        assert_eq!(config.moderation.scan_interval_seconds, 5);
        assert_eq!(config.discord.active_players_channel_id, Some(42));
        assert_eq!(config.discord.escalation_channel_id, Some(42));
    }

    #[test]
    fn parse_score_map_skips_malformed_entries() {
        let scores = parse_score_map("123:10, 456:x, nope, 789:-5");
        assert_eq!(scores.get("123"), Some(&10));
        assert_eq!(scores.get("789"), Some(&-5));
        assert_eq!(scores.len(), 2);
    }

    #[test]
    fn roundtrips_through_yaml() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(
            parsed.moderation.scan_keywords.len(),
            config.moderation.scan_keywords.len()
        );
    }
}
