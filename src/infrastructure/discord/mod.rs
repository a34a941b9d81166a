//! Gateway event handling
//!
//! One serenity event handler wires the whole bot: slash command
//! registration and dispatch, the welcome flow, live message moderation,
//! and the one-time start of the background scanner and the active-players
//! web server.

pub mod commands;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serenity::all::{
    ChannelId, Colour, Command, Context, CreateEmbed, CreateMessage, EventHandler, GuildId,
    Interaction, Member, Mentionable, Message, Ready, RoleId, Timestamp,
};
use serenity::async_trait;
use tracing::{error, info, warn};

use crate::application::services::{DecisionEngine, FaqService, ScanService, TemplateService};
use crate::domain::entities::{Action, Decision, DecisionContext, MessageFacts};
use crate::infrastructure::config::Config;
use crate::infrastructure::memory::WordMemoryStore;
use crate::infrastructure::text::TextNormalizer;
use crate::infrastructure::web::ActivePlayersServer;

const MOD_ACTION_COLOR: u32 = 0xEF4444;
const ESCALATION_COLOR: u32 = 0xE11D48;

pub struct Handler {
    config: Config,
    faq: Arc<FaqService>,
    templates: Arc<TemplateService>,
    engine: Arc<DecisionEngine>,
    memory: Arc<WordMemoryStore>,
    normalizer: Arc<TextNormalizer>,
    scanner: Arc<ScanService>,
    started: AtomicBool,
}

impl Handler {
    pub fn new(
        config: Config,
        faq: Arc<FaqService>,
        templates: Arc<TemplateService>,
        engine: Arc<DecisionEngine>,
        memory: Arc<WordMemoryStore>,
        normalizer: Arc<TextNormalizer>,
        scanner: Arc<ScanService>,
    ) -> Self {
        Self {
            config,
            faq,
            templates,
            engine,
            memory,
            normalizer,
            scanner,
            started: AtomicBool::new(false),
        }
    }

    async fn register_commands(&self, ctx: &Context) {
        let commands = commands::build_commands(&self.faq);
        let result = match self.config.discord.guild_id {
            Some(guild_id) => {
                GuildId::new(guild_id)
                    .set_commands(&ctx.http, commands)
                    .await
            }
            None => Command::set_global_commands(&ctx.http, commands).await,
        };
        if let Err(e) = result {
            error!("Failed to register slash commands: {}", e);
        }
    }

    fn start_background_services(&self, ctx: &Context) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        self.scanner.start(ctx.http.clone());
        if let Some(channel_id) = self.config.discord.active_players_channel_id {
            ActivePlayersServer::new(
                self.config.web.port,
                self.config.web.token.clone(),
                channel_id,
            )
            .start(ctx.http.clone());
        }
    }

    fn is_staff_message(&self, message: &Message) -> bool {
        let Some(member) = message.member.as_deref() else {
            return false;
        };
        match self.config.discord.staff_role_id {
            Some(role_id) => member.roles.contains(&RoleId::new(role_id)),
            None => member
                .permissions
                .is_some_and(|permissions| permissions.manage_messages()),
        }
    }

    async fn moderate_message(&self, ctx: &Context, message: &Message) {
        if message.author.bot || message.webhook_id.is_some() {
            return;
        }
        let Some(guild_id) = message.guild_id else {
            return;
        };
        if self.is_staff_message(message) {
            return;
        }
        self.memory.record_message(
            &guild_id.to_string(),
            &message.channel_id.to_string(),
            &message.author.id.to_string(),
            &self.normalizer.normalize(&message.content),
            message.timestamp.to_utc(),
        );
        let facts = MessageFacts {
            guild_id: guild_id.to_string(),
            channel_id: message.channel_id.to_string(),
            user_id: message.author.id.to_string(),
            content: message.content.clone(),
        };
        let decision = self.engine.evaluate(&facts).await;
        match decision.action {
            Action::Delete => {
                if let Err(e) = message.delete(&ctx.http).await {
                    warn!("Failed to delete message: {}", e);
                }
                self.send_delete_notice(ctx, message, &decision.context).await;
                self.log_moderation_action(ctx, message, &decision).await;
            }
            Action::Warn => {
                self.send_warning(ctx, message, &decision.context).await;
                self.log_moderation_action(ctx, message, &decision).await;
            }
            Action::EscalateToMods => {
                self.log_escalation(ctx, message, &decision).await;
            }
            Action::Allow => {}
        }
    }

    async fn send_warning(&self, ctx: &Context, message: &Message, context: &DecisionContext) {
        let notice = match &context.matched_keyword {
            Some(keyword) => format!(
                "{} please avoid discussing or sharing content related to **{}**.",
                message.author.mention(),
                keyword
            ),
            None => format!(
                "{} please keep messages appropriate for this channel.",
                message.author.mention()
            ),
        };
        if let Err(e) = message.channel_id.say(&ctx.http, notice).await {
            warn!("Failed to send warning: {}", e);
        }
    }

    async fn send_delete_notice(&self, ctx: &Context, message: &Message, context: &DecisionContext) {
        let notice = if context.matched_blocked_pattern.is_some() {
            format!(
                "{} please avoid posting invite or scam links.",
                message.author.mention()
            )
        } else {
            format!(
                "{} your message was removed for moderation review.",
                message.author.mention()
            )
        };
        if let Err(e) = message.channel_id.say(&ctx.http, notice).await {
            warn!("Failed to send delete notice: {}", e);
        }
    }

    async fn log_moderation_action(&self, ctx: &Context, message: &Message, decision: &Decision) {
        let Some(mod_log) = self.config.discord.mod_log_channel_id else {
            return;
        };
        let embed = decision_fields(
            CreateEmbed::new()
                .title(format!("Auto-moderation action: {}", decision.action.as_str()))
                .colour(Colour::new(MOD_ACTION_COLOR)),
            message,
            &decision.context,
        );
        if let Err(e) = ChannelId::new(mod_log)
            .send_message(&ctx.http, CreateMessage::new().embed(embed))
            .await
        {
            warn!("Failed to post moderation log: {}", e);
        }
    }

    async fn log_escalation(&self, ctx: &Context, message: &Message, decision: &Decision) {
        let mod_log = self.config.discord.mod_log_channel_id;
        let escalation = self.config.discord.escalation_channel_id;
        if mod_log.is_none() && escalation.is_none() {
            return;
        }
        let embed = decision_fields(
            CreateEmbed::new()
                .title(format!("Escalation needed: {}", decision.action.as_str()))
                .description("Automated moderation flagged this message for manual review.")
                .colour(Colour::new(ESCALATION_COLOR)),
            message,
            &decision.context,
        );
        if let Some(channel_id) = mod_log {
            if let Err(e) = ChannelId::new(channel_id)
                .send_message(&ctx.http, CreateMessage::new().embed(embed.clone()))
                .await
            {
                warn!("Failed to post escalation to mod log: {}", e);
            }
        }
        if let Some(channel_id) = escalation {
            if mod_log == Some(channel_id) {
                return;
            }
            if let Err(e) = ChannelId::new(channel_id)
                .send_message(&ctx.http, CreateMessage::new().embed(embed))
                .await
            {
                warn!("Failed to post escalation: {}", e);
            }
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("Connected as {}", ready.user.name);
        self.register_commands(&ctx).await;
        self.start_background_services(&ctx);
    }

    async fn guild_member_addition(&self, ctx: Context, member: Member) {
        let Some(channel_id) = self.config.discord.welcome_channel_id else {
            return;
        };
        let embed = self.templates.welcome_embed(&member.mention().to_string());
        if let Err(e) = ChannelId::new(channel_id)
            .send_message(&ctx.http, CreateMessage::new().embed(embed))
            .await
        {
            warn!("Failed to send welcome message: {}", e);
        }
    }

    async fn message(&self, ctx: Context, message: Message) {
        self.moderate_message(&ctx, &message).await;
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            commands::dispatch(&ctx, &command, &self.config, &self.faq, &self.templates).await;
        }
    }
}

/// Appends the shared decision breakdown fields to a moderation embed.
fn decision_fields(embed: CreateEmbed, message: &Message, context: &DecisionContext) -> CreateEmbed {
    embed
        .field("Member", message.author.tag(), true)
        .field("Channel", format!("<#{}>", message.channel_id), true)
        .field("Content", context.content.clone(), false)
        .field(
            "Matched keyword",
            safe_value(context.matched_keyword.as_deref()),
            true,
        )
        .field(
            "Blocked pattern",
            safe_value(context.matched_blocked_pattern.as_deref()),
            true,
        )
        .field("LLM risk", context.llm_risk.as_str(), true)
        .field("LLM rationale", safe_value(Some(&context.llm_rationale)), false)
        .field(
            "Scores (base/format/history/channel/total)",
            format!(
                "{} / {} / {} / {} / {}",
                context.base_score,
                context.message_format_score,
                context.history_score,
                context.channel_risk_score,
                context.total_score
            ),
            false,
        )
        .field("LLM score floor", context.llm_floor.to_string(), true)
        .field(
            "Thresholds (warn/delete/escalate)",
            format!(
                "{} / {} / {}",
                context.warn_threshold, context.delete_threshold, context.escalate_threshold
            ),
            true,
        )
        .field(
            "Message stats (len/links/uppercase%)",
            format!(
                "{} / {} / {:.0}%",
                context.message_length,
                context.link_count,
                context.uppercase_ratio * 100.0
            ),
            true,
        )
        .field(
            "History (recent matches/total tokens)",
            format!(
                "{} / {}",
                context.recent_keyword_matches, context.total_recent_tokens
            ),
            true,
        )
        .timestamp(Timestamp::now())
}

fn safe_value(value: Option<&str>) -> String {
    match value {
        Some(value) if !value.trim().is_empty() => value.to_string(),
        _ => "None".to_string(),
    }
}
