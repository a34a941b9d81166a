//! Reusable embed templates

use serenity::all::{CreateEmbed, Timestamp};

use crate::infrastructure::config::LinksConfig;

const WELCOME_COLOR: u32 = 0x7F5AF0;
const ABOUT_COLOR: u32 = 0x2CB67D;
const EVENT_COLOR: u32 = 0x3D5AFE;

pub struct TemplateService {
    links: LinksConfig,
}

impl TemplateService {
    pub fn new(links: LinksConfig) -> Self {
        Self { links }
    }

    pub fn welcome_embed(&self, member_mention: &str) -> CreateEmbed {
        let mut embed = CreateEmbed::new()
            .title("Welcome to the VRChat hub!")
            .description(format!(
                "Hey {}! We're excited to explore new worlds with you.",
                member_mention
            ))
            .timestamp(Timestamp::now())
            .color(WELCOME_COLOR);
        if let Some(rules) = &self.links.rules {
            embed = embed.field("Rules", format!("Read them here: {}", rules), false);
        }
        if let Some(group) = &self.links.group {
            embed = embed.field("VRC Group", group.clone(), false);
        }
        embed
    }

    pub fn about_embed(&self) -> CreateEmbed {
        let mut embed = CreateEmbed::new()
            .title("VRC Group Assistant")
            .description(
                "Helping the community stay organized with smart reminders, FAQs, and event tools.",
            )
            .color(ABOUT_COLOR);
        if let Some(support) = &self.links.support {
            embed = embed.field("Support", support.clone(), false);
        }
        embed
    }

    pub fn event_embed(&self, name: &str, time: &str, details: &str, host_mention: &str) -> CreateEmbed {
        CreateEmbed::new()
            .title(format!("Community Event: {}", name))
            .description(details)
            .field("Time", time, true)
            .field("Host", host_mention, true)
            .color(EVENT_COLOR)
            .timestamp(Timestamp::now())
    }
}
