//! CDN URL builder.
//!
//! Pure string formatting over a closed set of endpoints, with validation of
//! the allowed image extensions and sizes.

use std::fmt;

/// Extensions the CDN serves.
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["webp", "png", "jpg", "jpeg", "gif"];
/// Sizes the CDN serves (powers of two).
pub const ALLOWED_SIZES: [u16; 9] = [16, 32, 64, 128, 256, 512, 1024, 2048, 4096];

/// Errors returned for invalid CDN image parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CdnError {
    InvalidExtension(String),
    InvalidSize(u16),
}

impl fmt::Display for CdnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CdnError::InvalidExtension(ext) => {
                write!(f, "invalid image extension {ext:?} (allowed: {ALLOWED_EXTENSIONS:?})")
            }
            CdnError::InvalidSize(size) => {
                write!(f, "invalid image size {size} (allowed: {ALLOWED_SIZES:?})")
            }
        }
    }
}

impl std::error::Error for CdnError {}

fn check_extension(extension: &str) -> Result<(), CdnError> {
    if ALLOWED_EXTENSIONS.contains(&extension) {
        Ok(())
    } else {
        Err(CdnError::InvalidExtension(extension.to_string()))
    }
}

fn check_size(size: Option<u16>) -> Result<(), CdnError> {
    match size {
        Some(s) if !ALLOWED_SIZES.contains(&s) => Err(CdnError::InvalidSize(s)),
        _ => Ok(()),
    }
}

fn size_suffix(size: Option<u16>) -> String {
    size.map(|s| format!("?size={s}")).unwrap_or_default()
}

/// URL builder over a CDN base.
#[derive(Debug, Clone)]
pub struct CdnEndpoints {
    base: String,
}

impl CdnEndpoints {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    /// Custom emoji image.
    pub fn emoji(&self, emoji_id: &str, extension: &str) -> Result<String, CdnError> {
        check_extension(extension)?;
        Ok(format!("{}/emojis/{emoji_id}.{extension}", self.base))
    }

    /// Default avatar, assigned by discriminator modulo the set of five.
    pub fn default_avatar(&self, discriminator: u16) -> String {
        format!("{}/embed/avatars/{}.png", self.base, discriminator % 5)
    }

    /// User avatar. With `dynamic`, animated hashes (prefix `a_`) switch the
    /// extension to gif regardless of what was requested.
    pub fn avatar(
        &self,
        user_id: &str,
        hash: &str,
        extension: &str,
        size: Option<u16>,
        dynamic: bool,
    ) -> Result<String, CdnError> {
        check_extension(extension)?;
        check_size(size)?;
        let extension = if dynamic && hash.starts_with("a_") { "gif" } else { extension };
        Ok(format!(
            "{}/avatars/{user_id}/{hash}.{extension}{}",
            self.base,
            size_suffix(size)
        ))
    }

    /// Guild icon.
    pub fn icon(
        &self,
        guild_id: &str,
        hash: &str,
        extension: &str,
        size: Option<u16>,
    ) -> Result<String, CdnError> {
        check_extension(extension)?;
        check_size(size)?;
        Ok(format!("{}/icons/{guild_id}/{hash}.{extension}{}", self.base, size_suffix(size)))
    }

    /// Guild invite splash.
    pub fn splash(
        &self,
        guild_id: &str,
        hash: &str,
        extension: &str,
        size: Option<u16>,
    ) -> Result<String, CdnError> {
        check_extension(extension)?;
        check_size(size)?;
        Ok(format!(
            "{}/splashes/{guild_id}/{hash}.{extension}{}",
            self.base,
            size_suffix(size)
        ))
    }

    /// Guild discovery splash.
    pub fn discovery_splash(
        &self,
        guild_id: &str,
        hash: &str,
        extension: &str,
        size: Option<u16>,
    ) -> Result<String, CdnError> {
        check_extension(extension)?;
        check_size(size)?;
        Ok(format!(
            "{}/discovery-splashes/{guild_id}/{hash}.{extension}{}",
            self.base,
            size_suffix(size)
        ))
    }

    /// Guild banner.
    pub fn banner(
        &self,
        guild_id: &str,
        hash: &str,
        extension: &str,
        size: Option<u16>,
    ) -> Result<String, CdnError> {
        check_extension(extension)?;
        check_size(size)?;
        Ok(format!("{}/banners/{guild_id}/{hash}.{extension}{}", self.base, size_suffix(size)))
    }

    /// Group DM channel icon.
    pub fn channel_icon(
        &self,
        channel_id: &str,
        hash: &str,
        extension: &str,
        size: Option<u16>,
    ) -> Result<String, CdnError> {
        check_extension(extension)?;
        check_size(size)?;
        Ok(format!(
            "{}/channel-icons/{channel_id}/{hash}.{extension}{}",
            self.base,
            size_suffix(size)
        ))
    }

    /// Application icon.
    pub fn app_icon(
        &self,
        application_id: &str,
        hash: &str,
        extension: &str,
        size: Option<u16>,
    ) -> Result<String, CdnError> {
        check_extension(extension)?;
        check_size(size)?;
        Ok(format!(
            "{}/app-icons/{application_id}/{hash}.{extension}{}",
            self.base,
            size_suffix(size)
        ))
    }

    /// Application asset.
    pub fn app_asset(
        &self,
        application_id: &str,
        asset_id: &str,
        extension: &str,
        size: Option<u16>,
    ) -> Result<String, CdnError> {
        check_extension(extension)?;
        check_size(size)?;
        Ok(format!(
            "{}/app-assets/{application_id}/{asset_id}.{extension}{}",
            self.base,
            size_suffix(size)
        ))
    }

    /// Team icon.
    pub fn team_icon(
        &self,
        team_id: &str,
        hash: &str,
        extension: &str,
        size: Option<u16>,
    ) -> Result<String, CdnError> {
        check_extension(extension)?;
        check_size(size)?;
        Ok(format!(
            "{}/team-icons/{team_id}/{hash}.{extension}{}",
            self.base,
            size_suffix(size)
        ))
    }
}
