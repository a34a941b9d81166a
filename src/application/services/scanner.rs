//! Background channel scanning
//!
//! Polls the configured channels on a fixed interval, records every human
//! message into word memory and flags keyword hits to the mod-log channel.
//! Unlike the gateway listener this catches messages sent while the bot was
//! offline.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use regex_lite::Regex;
use serenity::all::{
    ChannelId, Colour, CreateEmbed, CreateMessage, GetMessages, GuildId, Http, Message, MessageId,
    Timestamp,
};
use tracing::{debug, warn};

use crate::infrastructure::config::Config;
use crate::infrastructure::memory::WordMemoryStore;
use crate::infrastructure::text::{
    compile_keyword_pattern, is_age_gap_concern, matches_any, TextNormalizer,
};

const FLAG_COLOR: u32 = 0xF97316;
const INITIAL_FETCH_LIMIT: u8 = 20;
const CATCH_UP_FETCH_LIMIT: u8 = 50;

pub struct ScanService {
    channel_ids: Vec<u64>,
    interval: Duration,
    mod_log_channel_id: Option<u64>,
    keyword_patterns: Vec<(String, Regex)>,
    memory: Arc<WordMemoryStore>,
    normalizer: Arc<TextNormalizer>,
    last_message_ids: Mutex<HashMap<u64, MessageId>>,
    guild_ids: Mutex<HashMap<u64, GuildId>>,
}

impl ScanService {
    pub fn new(
        config: &Config,
        memory: Arc<WordMemoryStore>,
        normalizer: Arc<TextNormalizer>,
    ) -> Self {
        let keyword_patterns = config
            .moderation
            .scan_keywords
            .iter()
            .filter_map(|keyword| {
                compile_keyword_pattern(keyword).map(|pattern| (keyword.clone(), pattern))
            })
            .collect();
        Self {
            channel_ids: config.moderation.scan_channel_ids.clone(),
            interval: Duration::from_secs(config.moderation.scan_interval_seconds),
            mod_log_channel_id: config.discord.mod_log_channel_id,
            keyword_patterns,
            memory,
            normalizer,
            last_message_ids: Mutex::new(HashMap::new()),
            guild_ids: Mutex::new(HashMap::new()),
        }
    }

    /// Spawns one polling task per scanned channel. The first pass runs a
    /// full interval after startup.
    pub fn start(self: &Arc<Self>, http: Arc<Http>) {
        for &channel_id in &self.channel_ids {
            let service = Arc::clone(self);
            let http = Arc::clone(&http);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(service.interval);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    service.scan_channel(&http, ChannelId::new(channel_id)).await;
                }
            });
        }
    }

    async fn scan_channel(&self, http: &Arc<Http>, channel_id: ChannelId) {
        let last_id = self.last_id(channel_id);
        let request = match last_id {
            Some(last) => GetMessages::new().after(last).limit(CATCH_UP_FETCH_LIMIT),
            None => GetMessages::new().limit(INITIAL_FETCH_LIMIT),
        };
        let mut messages = match channel_id.messages(http, request).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!("Failed to fetch messages for channel {}: {}", channel_id, e);
                return;
            }
        };
        if messages.is_empty() {
            return;
        }
        let Some(guild_id) = self.guild_for(http, channel_id).await else {
            return;
        };
        // oldest first, so memory and flags follow message order
        messages.sort_by_key(|message| message.timestamp);
        for message in &messages {
            self.process_message(http, channel_id, guild_id, message).await;
        }
        if let Some(newest) = messages.last() {
            self.set_last_id(channel_id, newest.id);
        }
    }

    async fn process_message(
        &self,
        http: &Arc<Http>,
        channel_id: ChannelId,
        guild_id: GuildId,
        message: &Message,
    ) {
        if message.author.bot || message.webhook_id.is_some() {
            return;
        }
        let content = message.content.as_str();
        self.memory.record_message(
            &guild_id.to_string(),
            &channel_id.to_string(),
            &message.author.id.to_string(),
            &self.normalizer.normalize(content),
            message.timestamp.to_utc(),
        );
        let result = self.normalizer.normalize_and_expand(content);
        let candidates = [content, result.normalized.as_str(), result.expanded.as_str()];
        if is_age_gap_concern(content, &result.normalized, &result.expanded) {
            self.flag_message(http, channel_id, guild_id, message, "age gap (adult/minor)")
                .await;
            return;
        }
        for (keyword, pattern) in &self.keyword_patterns {
            if matches_any(pattern, &candidates) {
                self.flag_message(http, channel_id, guild_id, message, keyword).await;
                break;
            }
        }
    }

    async fn flag_message(
        &self,
        http: &Arc<Http>,
        channel_id: ChannelId,
        guild_id: GuildId,
        message: &Message,
        keyword: &str,
    ) {
        let Some(mod_log) = self.mod_log_channel_id else {
            debug!("Scan flag without mod-log channel: {}", keyword);
            return;
        };
        let recent_count = self.memory.token_count(
            &guild_id.to_string(),
            &channel_id.to_string(),
            &message.author.id.to_string(),
            keyword,
        );
        let embed = CreateEmbed::new()
            .title("Flagged message scan")
            .description(format!("Keyword match: **{}**", keyword))
            .field("Member", message.author.tag(), true)
            .field("Channel", format!("<#{}>", channel_id), true)
            .field("Content", message.content.clone(), false)
            .field("Recent matches (30d)", recent_count.to_string(), true)
            .timestamp(Timestamp::now())
            .colour(Colour::new(FLAG_COLOR));
        if let Err(e) = ChannelId::new(mod_log)
            .send_message(http, CreateMessage::new().embed(embed))
            .await
        {
            warn!("Failed to post scan flag: {}", e);
        }
    }

    fn last_id(&self, channel_id: ChannelId) -> Option<MessageId> {
        match self.last_message_ids.lock() {
            Ok(guard) => guard.get(&channel_id.get()).copied(),
            Err(poisoned) => poisoned.into_inner().get(&channel_id.get()).copied(),
        }
    }

    fn set_last_id(&self, channel_id: ChannelId, message_id: MessageId) {
        let mut guard = match self.last_message_ids.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.insert(channel_id.get(), message_id);
    }

    /// The REST message route does not include guild ids, so the channel's
    /// guild is resolved once and cached.
    async fn guild_for(&self, http: &Arc<Http>, channel_id: ChannelId) -> Option<GuildId> {
        {
            let guard = match self.guild_ids.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(&guild_id) = guard.get(&channel_id.get()) {
                return Some(guild_id);
            }
        }
        let channel = match channel_id.to_channel(http).await {
            Ok(channel) => channel,
            Err(e) => {
                warn!("Failed to resolve channel {}: {}", channel_id, e);
                return None;
            }
        };
        let guild_id = channel.guild().map(|guild_channel| guild_channel.guild_id)?;
        let mut guard = match self.guild_ids.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.insert(channel_id.get(), guild_id);
        Some(guild_id)
    }
}
