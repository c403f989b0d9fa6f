//! Diagnostic command surface
//!
//! Text commands typed into an engine console. They tune presentation and report counters but
//! never change how state is diffed or batched.

use crate::converter::TextureConverter;
use crate::device::RenderDevice;
use crate::error::RenderError;
use crate::gpu::GpuBackend;
use crate::state::FilterOverride;

/// A parsed console command
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Report the filter override, or set it
    Filter(Option<FilterOverride>),
    Brightness(f32),
    Stats,
    Flush,
    /// List the display resolutions on offer
    Resolutions,
}

impl Command {
    /// Parse one command line. Returns `None` for anything this renderer does not handle.
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let name = words.next()?;
        let arg = words.next();
        if words.next().is_some() {
            return None;
        }

        if name.eq_ignore_ascii_case("filter") {
            return match arg {
                None => Some(Command::Filter(None)),
                Some(arg) => FilterOverride::parse(arg).map(|f| Command::Filter(Some(f))),
            };
        }
        if name.eq_ignore_ascii_case("brightness") {
            let value = arg?.parse::<f32>().ok()?;
            return value.is_finite().then_some(Command::Brightness(value));
        }
        match (name.to_ascii_lowercase().as_str(), arg) {
            ("stats", None) => Some(Command::Stats),
            ("flush", None) => Some(Command::Flush),
            ("getres", None) => Some(Command::Resolutions),
            _ => None,
        }
    }
}

impl<G: GpuBackend, C: TextureConverter> RenderDevice<G, C> {
    /// Run a console command.
    ///
    /// Returns the reply text, or `None` when the command is not recognized.
    pub fn exec(&mut self, line: &str) -> Result<Option<String>, RenderError> {
        let Some(command) = Command::parse(line) else {
            tracing::debug!("Unhandled command: {:?}", line);
            return Ok(None);
        };

        let reply = match command {
            Command::Filter(None) => format!("filter {}", self.state().filter_override()),
            Command::Filter(Some(filter)) => {
                self.state_mut().set_filter_override(filter);
                format!("filter {}", filter)
            }
            Command::Brightness(value) => {
                self.set_brightness(value)?;
                format!("brightness {:.2}", self.brightness())
            }
            Command::Stats => self.stats().to_string(),
            Command::Flush => {
                self.flush_textures()?;
                "texture cache flushed".to_string()
            }
            Command::Resolutions => format_resolutions(&self.resolutions()),
        };
        Ok(Some(reply))
    }
}

/// Space-separated `WxH` list, the form engines parse resolution menus from.
fn format_resolutions(modes: &[(u32, u32)]) -> String {
    modes
        .iter()
        .map(|(w, h)| format!("{}x{}", w, h))
        .collect::<Vec<_>>()
        .join(" ")
}
