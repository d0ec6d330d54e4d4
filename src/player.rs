//! External media player launching
//!
//! Stream decoding is left to the player; we only build its command line.

use std::process::{Child, Command, Stdio};

use tracing::info;

use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::models::Channel;

/// Window title shown by players that accept one
fn window_title(channel: &Channel) -> String {
    format!("#{} {} ({} | {})", channel.sn, channel.name, channel.country, channel.group)
}

/// Build the player command for `channel` without spawning it
pub fn build_command(channel: &Channel, config: &AppConfig) -> Command {
    let player = config.player_command();
    let player_lower = player.to_lowercase();
    let title = window_title(channel);
    let user_agent = config.pass_user_agent_to_player.then_some(config.user_agent.as_str());

    let mut cmd = Command::new(player);

    // On Windows, hide the console window for ffplay
    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        if player_lower.contains("ffplay") {
            cmd.creation_flags(CREATE_NO_WINDOW);
        }
    }

    if player_lower.contains("ffplay") {
        cmd.args(["-autoexit", "-window_title", title.as_str()]);
        if let Some(ua) = user_agent {
            cmd.args(["-user_agent", ua]);
        }
        cmd.arg(&channel.url);
    } else if player_lower.contains("mpv") {
        cmd.arg(&channel.url);
        cmd.arg(format!("--force-media-title={}", title));
        if let Some(ua) = user_agent {
            cmd.arg(format!("--user-agent={}", ua));
        }
    } else if player_lower.contains("vlc") {
        cmd.arg(&channel.url);
        cmd.arg(format!("--meta-title={}", title));
        cmd.arg("--http-reconnect");
        if let Some(ua) = user_agent {
            cmd.arg(format!("--http-user-agent={}", ua));
        }
    } else {
        // Generic player - just pass URL
        cmd.arg(&channel.url);
    }

    cmd
}

/// Spawn the configured player for `channel` with stderr piped for logging
pub fn launch(channel: &Channel, config: &AppConfig) -> Result<Child> {
    let mut cmd = build_command(channel, config);
    cmd.stderr(Stdio::piped());
    cmd.stdout(Stdio::null());

    let child = cmd.spawn().map_err(|source| Error::PlayerLaunch {
        player: config.player_command().to_string(),
        source,
    })?;
    info!("Launched {} for '{}' (PID: {})", config.player_command(), channel.name, child.id());
    Ok(child)
}
