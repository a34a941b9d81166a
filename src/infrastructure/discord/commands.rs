//! Slash command definitions and handlers

use std::sync::Arc;

use serenity::all::{
    ChannelId, Colour, CommandDataOptionValue, CommandInteraction, CommandOptionType, Context,
    CreateCommand, CreateCommandOption, CreateEmbed, CreateInteractionResponse,
    CreateInteractionResponseFollowup, CreateInteractionResponseMessage, CreateMessage, GetMessages,
    Member, Mentionable, Timestamp,
};
use tracing::warn;

use crate::application::services::{FaqService, TemplateService};
use crate::domain::entities::FaqEntry;
use crate::infrastructure::config::Config;

const MAX_PURGE: u8 = 100;
const FAQ_COLOR: u32 = 0x00C2FF;
const SERVER_INFO_COLOR: u32 = 0xFF8906;
const STAFF_ALERT_COLOR: u32 = 0xFACC15;

pub fn build_commands(faq: &FaqService) -> Vec<CreateCommand> {
    let mut topic_option =
        CreateCommandOption::new(CommandOptionType::String, "topic", "Topic keyword")
            .required(true);
    for entry in faq.entries() {
        topic_option = topic_option.add_string_choice(&entry.topic, &entry.topic);
    }
    vec![
        CreateCommand::new("ping").description("Check bot latency."),
        CreateCommand::new("about").description("Learn about the VRC group assistant."),
        CreateCommand::new("server-info").description("Get stats about the server."),
        CreateCommand::new("faq")
            .description("Read quick answers about the group.")
            .add_option(topic_option),
        CreateCommand::new("faq-search")
            .description("Ask a question and get the closest FAQ match.")
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "question",
                    "What do you need help with?",
                )
                .required(true),
            ),
        CreateCommand::new("event-create")
            .description("Post a structured event announcement.")
            .add_option(
                CreateCommandOption::new(CommandOptionType::String, "name", "Event name")
                    .required(true),
            )
            .add_option(
                CreateCommandOption::new(CommandOptionType::String, "time", "Time and timezone")
                    .required(true),
            )
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "details",
                    "Details about the event",
                )
                .required(true),
            ),
        CreateCommand::new("staff-alert")
            .description("Send an alert to staff or the mod log.")
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    "message",
                    "Alert details for the staff team",
                )
                .required(true),
            ),
        CreateCommand::new("purge")
            .description("Remove a batch of recent messages.")
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::Integer,
                    "amount",
                    "How many messages to delete (1-100)",
                )
                .required(true),
            )
            .add_option(CreateCommandOption::new(
                CommandOptionType::Channel,
                "channel",
                "Target channel (defaults to current)",
            )),
    ]
}

pub async fn dispatch(
    ctx: &Context,
    command: &CommandInteraction,
    config: &Config,
    faq: &Arc<FaqService>,
    templates: &Arc<TemplateService>,
) {
    let result = match command.data.name.as_str() {
        "ping" => handle_ping(ctx, command).await,
        "about" => reply_embed(ctx, command, templates.about_embed(), false).await,
        "server-info" => handle_server_info(ctx, command).await,
        "faq" => handle_faq(ctx, command, faq).await,
        "faq-search" => handle_faq_search(ctx, command, faq).await,
        "event-create" => handle_event_create(ctx, command, config, templates).await,
        "staff-alert" => handle_staff_alert(ctx, command, config).await,
        "purge" => handle_purge(ctx, command, config).await,
        _ => reply_text(ctx, command, "Unknown command.", true).await,
    };
    if let Err(e) = result {
        warn!("Slash command '{}' failed: {}", command.data.name, e);
    }
}

async fn handle_ping(ctx: &Context, command: &CommandInteraction) -> serenity::Result<()> {
    let elapsed = Timestamp::now().to_utc() - command.id.created_at().to_utc();
    let latency = elapsed.num_milliseconds().max(0);
    reply_text(ctx, command, &format!("Pong! {}ms", latency), false).await
}

async fn handle_server_info(ctx: &Context, command: &CommandInteraction) -> serenity::Result<()> {
    let Some(guild_id) = command.guild_id else {
        return reply_text(
            ctx,
            command,
            "Server info is only available inside a guild.",
            true,
        )
        .await;
    };
    let guild = guild_id.to_partial_guild_with_counts(&ctx.http).await?;
    let channels = guild_id.channels(&ctx.http).await?;
    let members = guild.approximate_member_count.unwrap_or_default();
    let embed = CreateEmbed::new()
        .title("Server Overview")
        .description("Here is a quick snapshot of the server.")
        .field("Members", members.to_string(), true)
        .field("Channels", channels.len().to_string(), true)
        .field("Roles", guild.roles.len().to_string(), true)
        .colour(Colour::new(SERVER_INFO_COLOR));
    reply_embed(ctx, command, embed, false).await
}

async fn handle_faq(
    ctx: &Context,
    command: &CommandInteraction,
    faq: &Arc<FaqService>,
) -> serenity::Result<()> {
    let topic = option_str(command, "topic").unwrap_or_default();
    match faq.find_by_topic(topic) {
        Some(entry) => reply_embed(ctx, command, faq_embed(entry), false).await,
        None => reply_text(ctx, command, "I don't recognize that topic yet.", true).await,
    }
}

async fn handle_faq_search(
    ctx: &Context,
    command: &CommandInteraction,
    faq: &Arc<FaqService>,
) -> serenity::Result<()> {
    let question = option_str(command, "question").unwrap_or_default();
    let Some(entry) = faq.find_best_match(question) else {
        return reply_text(
            ctx,
            command,
            "I couldn't find a close FAQ match. Try a different phrasing.",
            true,
        )
        .await;
    };
    let mut embed = CreateEmbed::new()
        .title(format!("Best FAQ match: {}", entry.title))
        .description(&entry.description)
        .colour(Colour::new(FAQ_COLOR));
    let suggestions = faq.suggest_topics(question, 3);
    if !suggestions.is_empty() {
        let related = suggestions
            .iter()
            .map(|topic| format!("\u{2022} {}", topic))
            .collect::<Vec<_>>()
            .join("\n");
        embed = embed.field("Related topics", related, false);
    }
    reply_embed(ctx, command, embed, false).await
}

async fn handle_event_create(
    ctx: &Context,
    command: &CommandInteraction,
    config: &Config,
    templates: &Arc<TemplateService>,
) -> serenity::Result<()> {
    let Some(member) = command.member.as_deref() else {
        return reply_text(ctx, command, "Unable to identify host.", true).await;
    };
    let name = option_str(command, "name").unwrap_or_default();
    let time = option_str(command, "time").unwrap_or_default();
    let details = option_str(command, "details").unwrap_or_default();
    let host_mention = member.mention().to_string();
    let embed = templates.event_embed(name, time, details, &host_mention);
    reply_embed(ctx, command, embed, false).await?;

    if let Some(role_id) = config.discord.event_ping_role_id {
        let followup = command
            .create_followup(
                &ctx.http,
                CreateInteractionResponseFollowup::new()
                    .content(format!("<@&{}> event posted!", role_id)),
            )
            .await?;
        let http = ctx.http.clone();
        let command = command.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(10)).await;
            if let Err(e) = command.delete_followup(&http, followup.id).await {
                warn!("Failed to delete event ping: {}", e);
            }
        });
    }
    Ok(())
}

async fn handle_staff_alert(
    ctx: &Context,
    command: &CommandInteraction,
    config: &Config,
) -> serenity::Result<()> {
    let Some(member) = command.member.as_deref() else {
        return reply_text(ctx, command, "Unable to identify requestor.", true).await;
    };
    if !is_staff(member, config.discord.staff_role_id) {
        return reply_text(
            ctx,
            command,
            "You do not have permission to use this command.",
            true,
        )
        .await;
    }
    let message = option_str(command, "message").unwrap_or_default();
    let staff_mention = match config.discord.staff_role_id {
        Some(role_id) => format!("<@&{}>", role_id),
        None => "Staff".to_string(),
    };
    let embed = CreateEmbed::new()
        .title("Staff alert")
        .description(message)
        .field("Requested by", member.mention().to_string(), true)
        .timestamp(Timestamp::now())
        .colour(Colour::new(STAFF_ALERT_COLOR));

    let target = config
        .discord
        .mod_log_channel_id
        .map(ChannelId::new)
        .unwrap_or(command.channel_id);
    match target.say(&ctx.http, staff_mention).await {
        Ok(mention_post) => {
            let http = ctx.http.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                if let Err(e) = mention_post.delete(&http).await {
                    warn!("Failed to delete staff mention: {}", e);
                }
            });
        }
        Err(e) => warn!("Failed to post staff mention: {}", e),
    }
    if let Err(e) = target
        .send_message(&ctx.http, CreateMessage::new().embed(embed.clone()))
        .await
    {
        warn!("Failed to post staff alert: {}", e);
    }
    reply_embed(ctx, command, embed, true).await
}

async fn handle_purge(
    ctx: &Context,
    command: &CommandInteraction,
    config: &Config,
) -> serenity::Result<()> {
    let Some(member) = command.member.as_deref() else {
        return reply_text(ctx, command, "Unable to identify requestor.", true).await;
    };
    if !is_staff(member, config.discord.staff_role_id) {
        return reply_text(
            ctx,
            command,
            "You do not have permission to use this command.",
            true,
        )
        .await;
    }
    let amount = option_i64(command, "amount").unwrap_or(1).clamp(1, MAX_PURGE as i64) as u8;
    let channel = option_channel(command, "channel").unwrap_or(command.channel_id);
    let messages = channel
        .messages(&ctx.http, GetMessages::new().limit(amount))
        .await?;
    // bulk delete rejects messages older than two weeks
    let cutoff = Timestamp::now().to_utc() - chrono::Duration::days(14);
    let deletable: Vec<_> = messages
        .iter()
        .filter(|message| message.timestamp.to_utc() > cutoff)
        .collect();
    if deletable.is_empty() {
        return reply_text(
            ctx,
            command,
            "No recent messages were eligible for deletion.",
            true,
        )
        .await;
    }
    if deletable.len() == 1 {
        channel.delete_message(&ctx.http, deletable[0].id).await?;
    } else {
        let ids: Vec<_> = deletable.iter().map(|message| message.id).collect();
        channel.delete_messages(&ctx.http, ids).await?;
    }
    reply_text(
        ctx,
        command,
        &format!("Purged {} messages in <#{}>.", deletable.len(), channel),
        true,
    )
    .await
}

pub fn is_staff(member: &Member, staff_role_id: Option<u64>) -> bool {
    match staff_role_id {
        Some(role_id) => member.roles.iter().any(|role| role.get() == role_id),
        None => member
            .permissions
            .is_some_and(|permissions| permissions.manage_messages()),
    }
}

fn faq_embed(entry: &FaqEntry) -> CreateEmbed {
    CreateEmbed::new()
        .title(&entry.title)
        .description(&entry.description)
        .colour(Colour::new(FAQ_COLOR))
}

fn option_str<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| option.value.as_str())
}

fn option_i64(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| option.value.as_i64())
}

fn option_channel(command: &CommandInteraction, name: &str) -> Option<ChannelId> {
    command
        .data
        .options
        .iter()
        .find(|option| option.name == name)
        .and_then(|option| match option.value {
            CommandDataOptionValue::Channel(channel_id) => Some(channel_id),
            _ => None,
        })
}

async fn reply_text(
    ctx: &Context,
    command: &CommandInteraction,
    content: &str,
    ephemeral: bool,
) -> serenity::Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(ephemeral),
            ),
        )
        .await
}

async fn reply_embed(
    ctx: &Context,
    command: &CommandInteraction,
    embed: CreateEmbed,
    ephemeral: bool,
) -> serenity::Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(ephemeral),
            ),
        )
        .await
}
