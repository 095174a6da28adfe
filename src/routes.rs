//! Route catalog: template functions mapping logical API calls to request
//! paths and rate-limit bucket identities.
//!
//! Every function returns an [`ApiRoute`]: the literal request path plus the
//! [`RouteIdentifier`] used for bucket keying. Bucket routes keep the literal
//! ID for the *major* parameter (guild, channel, or webhook ID, the segment
//! the server partitions limits on) and generalize every other ID to a
//! placeholder, so e.g. all messages in one channel share a bucket while two
//! channels never do.

/// Major parameter used by routes that have none of their own.
pub const GLOBAL_MAJOR: &str = "global";

/// Bucket identity of a request: a generalized route plus the literal major
/// parameter it is partitioned by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteIdentifier {
    pub route: String,
    pub major_parameter: String,
}

impl RouteIdentifier {
    pub fn new(route: impl Into<String>, major_parameter: impl Into<String>) -> Self {
        Self { route: route.into(), major_parameter: major_parameter.into() }
    }
}

/// A request path paired with its bucket identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRoute {
    pub path: String,
    pub bucket: RouteIdentifier,
}

impl ApiRoute {
    fn new(path: String, route: String, major: impl Into<String>) -> Self {
        Self { path, bucket: RouteIdentifier::new(route, major) }
    }

    fn global(path: String, route: String) -> Self {
        Self::new(path, route, GLOBAL_MAJOR)
    }
}

// Channels

pub fn channel(channel_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/channels/{channel_id}"),
        format!("/channels/{channel_id}"),
        channel_id,
    )
}

pub fn channel_messages(channel_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/channels/{channel_id}/messages"),
        format!("/channels/{channel_id}/messages"),
        channel_id,
    )
}

pub fn channel_message(channel_id: &str, message_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/channels/{channel_id}/messages/{message_id}"),
        format!("/channels/{channel_id}/messages/{{message_id}}"),
        channel_id,
    )
}

pub fn channel_message_crosspost(channel_id: &str, message_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/channels/{channel_id}/messages/{message_id}/crosspost"),
        format!("/channels/{channel_id}/messages/{{message_id}}/crosspost"),
        channel_id,
    )
}

pub fn channel_message_reactions(channel_id: &str, message_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/channels/{channel_id}/messages/{message_id}/reactions"),
        format!("/channels/{channel_id}/messages/{{message_id}}/reactions"),
        channel_id,
    )
}

pub fn channel_message_reaction(channel_id: &str, message_id: &str, emoji: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/channels/{channel_id}/messages/{message_id}/reactions/{emoji}"),
        format!("/channels/{channel_id}/messages/{{message_id}}/reactions/{{emoji}}"),
        channel_id,
    )
}

pub fn channel_message_own_reaction(
    channel_id: &str,
    message_id: &str,
    emoji: &str,
) -> ApiRoute {
    ApiRoute::new(
        format!("/channels/{channel_id}/messages/{message_id}/reactions/{emoji}/@me"),
        format!("/channels/{channel_id}/messages/{{message_id}}/reactions/{{emoji}}/@me"),
        channel_id,
    )
}

pub fn channel_message_user_reaction(
    channel_id: &str,
    message_id: &str,
    emoji: &str,
    user_id: &str,
) -> ApiRoute {
    ApiRoute::new(
        format!("/channels/{channel_id}/messages/{message_id}/reactions/{emoji}/{user_id}"),
        format!(
            "/channels/{channel_id}/messages/{{message_id}}/reactions/{{emoji}}/{{user_id}}"
        ),
        channel_id,
    )
}

pub fn channel_bulk_delete(channel_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/channels/{channel_id}/messages/bulk-delete"),
        format!("/channels/{channel_id}/messages/bulk-delete"),
        channel_id,
    )
}

pub fn channel_typing(channel_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/channels/{channel_id}/typing"),
        format!("/channels/{channel_id}/typing"),
        channel_id,
    )
}

pub fn channel_pins(channel_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/channels/{channel_id}/pins"),
        format!("/channels/{channel_id}/pins"),
        channel_id,
    )
}

pub fn channel_pin(channel_id: &str, message_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/channels/{channel_id}/pins/{message_id}"),
        format!("/channels/{channel_id}/pins/{{message_id}}"),
        channel_id,
    )
}

pub fn channel_permission(channel_id: &str, overwrite_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/channels/{channel_id}/permissions/{overwrite_id}"),
        format!("/channels/{channel_id}/permissions/{{overwrite_id}}"),
        channel_id,
    )
}

pub fn channel_invites(channel_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/channels/{channel_id}/invites"),
        format!("/channels/{channel_id}/invites"),
        channel_id,
    )
}

pub fn channel_webhooks(channel_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/channels/{channel_id}/webhooks"),
        format!("/channels/{channel_id}/webhooks"),
        channel_id,
    )
}

pub fn channel_followers(channel_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/channels/{channel_id}/followers"),
        format!("/channels/{channel_id}/followers"),
        channel_id,
    )
}

pub fn channel_recipient(channel_id: &str, user_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/channels/{channel_id}/recipients/{user_id}"),
        format!("/channels/{channel_id}/recipients/{{user_id}}"),
        channel_id,
    )
}

// Guilds

pub fn guilds() -> ApiRoute {
    ApiRoute::global("/guilds".into(), "/guilds".into())
}

pub fn guild(guild_id: &str) -> ApiRoute {
    ApiRoute::new(format!("/guilds/{guild_id}"), format!("/guilds/{guild_id}"), guild_id)
}

pub fn guild_preview(guild_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/guilds/{guild_id}/preview"),
        format!("/guilds/{guild_id}/preview"),
        guild_id,
    )
}

pub fn guild_channels(guild_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/guilds/{guild_id}/channels"),
        format!("/guilds/{guild_id}/channels"),
        guild_id,
    )
}

pub fn guild_members(guild_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/guilds/{guild_id}/members"),
        format!("/guilds/{guild_id}/members"),
        guild_id,
    )
}

pub fn guild_members_search(guild_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/guilds/{guild_id}/members/search"),
        format!("/guilds/{guild_id}/members/search"),
        guild_id,
    )
}

pub fn guild_member(guild_id: &str, user_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/guilds/{guild_id}/members/{user_id}"),
        format!("/guilds/{guild_id}/members/{{user_id}}"),
        guild_id,
    )
}

pub fn guild_member_me(guild_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/guilds/{guild_id}/members/@me"),
        format!("/guilds/{guild_id}/members/@me"),
        guild_id,
    )
}

pub fn guild_member_role(guild_id: &str, user_id: &str, role_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/guilds/{guild_id}/members/{user_id}/roles/{role_id}"),
        format!("/guilds/{guild_id}/members/{{user_id}}/roles/{{role_id}}"),
        guild_id,
    )
}

pub fn guild_bans(guild_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/guilds/{guild_id}/bans"),
        format!("/guilds/{guild_id}/bans"),
        guild_id,
    )
}

pub fn guild_ban(guild_id: &str, user_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/guilds/{guild_id}/bans/{user_id}"),
        format!("/guilds/{guild_id}/bans/{{user_id}}"),
        guild_id,
    )
}

pub fn guild_roles(guild_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/guilds/{guild_id}/roles"),
        format!("/guilds/{guild_id}/roles"),
        guild_id,
    )
}

pub fn guild_role(guild_id: &str, role_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/guilds/{guild_id}/roles/{role_id}"),
        format!("/guilds/{guild_id}/roles/{{role_id}}"),
        guild_id,
    )
}

pub fn guild_prune(guild_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/guilds/{guild_id}/prune"),
        format!("/guilds/{guild_id}/prune"),
        guild_id,
    )
}

pub fn guild_regions(guild_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/guilds/{guild_id}/regions"),
        format!("/guilds/{guild_id}/regions"),
        guild_id,
    )
}

pub fn guild_invites(guild_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/guilds/{guild_id}/invites"),
        format!("/guilds/{guild_id}/invites"),
        guild_id,
    )
}

pub fn guild_integrations(guild_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/guilds/{guild_id}/integrations"),
        format!("/guilds/{guild_id}/integrations"),
        guild_id,
    )
}

pub fn guild_integration(guild_id: &str, integration_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/guilds/{guild_id}/integrations/{integration_id}"),
        format!("/guilds/{guild_id}/integrations/{{integration_id}}"),
        guild_id,
    )
}

pub fn guild_widget(guild_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/guilds/{guild_id}/widget"),
        format!("/guilds/{guild_id}/widget"),
        guild_id,
    )
}

pub fn guild_vanity_url(guild_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/guilds/{guild_id}/vanity-url"),
        format!("/guilds/{guild_id}/vanity-url"),
        guild_id,
    )
}

pub fn guild_emojis(guild_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/guilds/{guild_id}/emojis"),
        format!("/guilds/{guild_id}/emojis"),
        guild_id,
    )
}

pub fn guild_emoji(guild_id: &str, emoji_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/guilds/{guild_id}/emojis/{emoji_id}"),
        format!("/guilds/{guild_id}/emojis/{{emoji_id}}"),
        guild_id,
    )
}

pub fn guild_audit_logs(guild_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/guilds/{guild_id}/audit-logs"),
        format!("/guilds/{guild_id}/audit-logs"),
        guild_id,
    )
}

pub fn guild_webhooks(guild_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/guilds/{guild_id}/webhooks"),
        format!("/guilds/{guild_id}/webhooks"),
        guild_id,
    )
}

// Users

pub fn user(user_id: &str) -> ApiRoute {
    ApiRoute::global(format!("/users/{user_id}"), "/users/{user_id}".into())
}

pub fn user_me() -> ApiRoute {
    ApiRoute::global("/users/@me".into(), "/users/@me".into())
}

pub fn user_me_guilds() -> ApiRoute {
    ApiRoute::global("/users/@me/guilds".into(), "/users/@me/guilds".into())
}

pub fn user_me_guild(guild_id: &str) -> ApiRoute {
    ApiRoute::global(
        format!("/users/@me/guilds/{guild_id}"),
        "/users/@me/guilds/{guild_id}".into(),
    )
}

pub fn user_me_channels() -> ApiRoute {
    ApiRoute::global("/users/@me/channels".into(), "/users/@me/channels".into())
}

pub fn user_me_connections() -> ApiRoute {
    ApiRoute::global("/users/@me/connections".into(), "/users/@me/connections".into())
}

// Webhooks

pub fn webhook(webhook_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/webhooks/{webhook_id}"),
        format!("/webhooks/{webhook_id}"),
        webhook_id,
    )
}

pub fn webhook_with_token(webhook_id: &str, token: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/webhooks/{webhook_id}/{token}"),
        format!("/webhooks/{webhook_id}/{{token}}"),
        webhook_id,
    )
}

pub fn webhook_github(webhook_id: &str, token: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/webhooks/{webhook_id}/{token}/github"),
        format!("/webhooks/{webhook_id}/{{token}}/github"),
        webhook_id,
    )
}

pub fn webhook_slack(webhook_id: &str, token: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/webhooks/{webhook_id}/{token}/slack"),
        format!("/webhooks/{webhook_id}/{{token}}/slack"),
        webhook_id,
    )
}

pub fn webhook_message(webhook_id: &str, token: &str, message_id: &str) -> ApiRoute {
    ApiRoute::new(
        format!("/webhooks/{webhook_id}/{token}/messages/{message_id}"),
        format!("/webhooks/{webhook_id}/{{token}}/messages/{{message_id}}"),
        webhook_id,
    )
}

// Invites, gateway, voice, applications

pub fn invite(code: &str) -> ApiRoute {
    ApiRoute::global(format!("/invites/{code}"), "/invites/{code}".into())
}

pub fn gateway() -> ApiRoute {
    ApiRoute::global("/gateway".into(), "/gateway".into())
}

pub fn gateway_bot() -> ApiRoute {
    ApiRoute::global("/gateway/bot".into(), "/gateway/bot".into())
}

pub fn voice_regions() -> ApiRoute {
    ApiRoute::global("/voice/regions".into(), "/voice/regions".into())
}

pub fn oauth2_application_me() -> ApiRoute {
    ApiRoute::global(
        "/oauth2/applications/@me".into(),
        "/oauth2/applications/@me".into(),
    )
}
