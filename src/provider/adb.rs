use std::process::Stdio;
use std::sync::OnceLock;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tokio::time::{timeout, Duration};

use super::{Bounds, ElementHandle, RegionFilter, ScreenInteractionProvider, ScreenSize};
use crate::watchdog::focus::SYSTEM_OVERLAY_PREFIX;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

const COMMAND_TIMEOUT_SECS: u64 = 10;
const FALLBACK_SCREEN: ScreenSize = ScreenSize {
    width: 1080,
    height: 1920,
};

const KEYCODE_HOME: &str = "3";
const KEYCODE_BACK: &str = "4";

fn focus_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"mCurrentFocus=Window\{\S+ \S+ ([A-Za-z0-9_.]+)[/}]").expect("valid regex")
    })
}

fn focused_app_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"mFocusedApp=\S*\{?\S* \S+ ([A-Za-z0-9_.]+)/").expect("valid regex")
    })
}

fn size_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(Physical|Override) size: (\d+)x(\d+)").expect("valid regex"))
}

fn node_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<node\b([^>]*?)(/?)>|</node>").expect("valid regex"))
}

fn attr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"([\w-]+)="([^"]*)""#).expect("valid regex"))
}

fn bounds_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[(-?\d+),(-?\d+)\]\[(-?\d+),(-?\d+)\]").expect("valid regex"))
}

/// Drives a device through the `adb` command-line tool.
///
/// adb has no push channel for window changes, so pair this provider with a
/// [`crate::watchdog::ForegroundPoller`] to feed the watchdog.
pub struct AdbProvider {
    adb_path: String,
    serial: Option<String>,
    screen: OnceCell<ScreenSize>,
}

impl AdbProvider {
    pub fn new(serial: Option<String>) -> Self {
        let adb_path = std::env::var("APPDRIVER_ADB").unwrap_or_else(|_| "adb".to_string());
        Self {
            adb_path,
            serial,
            screen: OnceCell::new(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let mut command = Command::new(&self.adb_path);
        if let Some(serial) = &self.serial {
            command.args(["-s", serial]);
        }
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = timeout(Duration::from_secs(COMMAND_TIMEOUT_SECS), command.output())
            .await
            .map_err(|_| anyhow!("adb {} timed out", args.join(" ")))?
            .with_context(|| format!("failed to spawn {}", self.adb_path))?;

        if !output.status.success() {
            bail!(
                "adb {} exited with {}: {}",
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run_ok(&self, args: &[&str]) -> bool {
        match self.run(args).await {
            Ok(_) => true,
            Err(err) => {
                log_warn!("{err:#}");
                false
            }
        }
    }
}

#[async_trait]
impl ScreenInteractionProvider for AdbProvider {
    async fn has_foreground_query_capability(&self) -> bool {
        match self.run(&["get-state"]).await {
            Ok(state) => state.trim() == "device",
            Err(err) => {
                log_warn!("device not reachable: {err:#}");
                false
            }
        }
    }

    async fn query_foreground_package(&self) -> Option<String> {
        match self.run(&["shell", "dumpsys", "window"]).await {
            Ok(dump) => parse_foreground_package(&dump),
            Err(err) => {
                log_warn!("foreground query failed: {err:#}");
                None
            }
        }
    }

    async fn screen_size(&self) -> ScreenSize {
        *self
            .screen
            .get_or_init(|| async {
                match self.run(&["shell", "wm", "size"]).await {
                    Ok(output) => parse_screen_size(&output).unwrap_or(FALLBACK_SCREEN),
                    Err(err) => {
                        log_warn!("screen size query failed, assuming {FALLBACK_SCREEN:?}: {err:#}");
                        FALLBACK_SCREEN
                    }
                }
            })
            .await
    }

    async fn list_interactable_elements(&self, filter: &RegionFilter) -> Vec<ElementHandle> {
        let screen = self.screen_size().await;
        match self
            .run(&["exec-out", "uiautomator", "dump", "/dev/tty"])
            .await
        {
            Ok(xml) => parse_hierarchy(&xml, filter, screen),
            Err(err) => {
                log_debug!("ui dump failed: {err:#}");
                Vec::new()
            }
        }
    }

    async fn tap(&self, x: f32, y: f32) -> bool {
        let (x, y) = (x.round().to_string(), y.round().to_string());
        self.run_ok(&["shell", "input", "tap", &x, &y]).await
    }

    async fn swipe(&self, x1: f32, y1: f32, x2: f32, y2: f32, duration_ms: u64) -> bool {
        let coords = [x1, y1, x2, y2].map(|v| v.round().to_string());
        let duration = duration_ms.to_string();
        self.run_ok(&[
            "shell", "input", "swipe", &coords[0], &coords[1], &coords[2], &coords[3], &duration,
        ])
        .await
    }

    async fn dispatch_back(&self) -> bool {
        self.run_ok(&["shell", "input", "keyevent", KEYCODE_BACK]).await
    }

    async fn dispatch_home(&self) -> bool {
        self.run_ok(&["shell", "input", "keyevent", KEYCODE_HOME]).await
    }

    async fn launch(&self, package_id: &str) -> bool {
        self.run_ok(&[
            "shell",
            "monkey",
            "-p",
            package_id,
            "-c",
            "android.intent.category.LAUNCHER",
            "1",
        ])
        .await
    }
}

fn parse_foreground_package(dump: &str) -> Option<String> {
    let name = focus_regex()
        .captures(dump)
        .or_else(|| focused_app_regex().captures(dump))
        .map(|caps| caps[1].to_string())?;

    // Bare window titles (StatusBar, NotificationShade) are system UI surfaces.
    if name.contains('.') {
        Some(name)
    } else {
        Some(SYSTEM_OVERLAY_PREFIX.to_string())
    }
}

fn parse_screen_size(output: &str) -> Option<ScreenSize> {
    // An override size wins over the physical one when both are reported.
    let mut found = None;
    for caps in size_regex().captures_iter(output) {
        let width = caps[2].parse().ok()?;
        let height = caps[3].parse().ok()?;
        if width == 0 || height == 0 {
            continue;
        }
        let size = ScreenSize::new(width, height);
        if &caps[1] == "Override" || found.is_none() {
            found = Some(size);
        }
    }
    found
}

fn parse_bounds(raw: &str) -> Option<Bounds> {
    let caps = bounds_regex().captures(raw)?;
    Some(Bounds::new(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
        caps[4].parse().ok()?,
    ))
}

fn unescape(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|s| !s.is_empty()).map(unescape)
}

/// Walks a uiautomator dump depth-first, honouring the filter's depth and
/// result caps.
fn parse_hierarchy(xml: &str, filter: &RegionFilter, screen: ScreenSize) -> Vec<ElementHandle> {
    let mut elements = Vec::new();
    let mut depth: usize = 0;

    for caps in node_regex().captures_iter(xml) {
        let Some(attrs_raw) = caps.get(1) else {
            depth = depth.saturating_sub(1);
            continue;
        };
        let self_closing = caps.get(2).map(|m| m.as_str() == "/").unwrap_or(false);
        let node_depth = depth;
        if !self_closing {
            depth += 1;
        }

        if node_depth > filter.max_depth {
            continue;
        }

        let mut clickable = false;
        let mut enabled = true;
        let mut visible = true;
        let mut text = None;
        let mut description = None;
        let mut class_name = None;
        let mut bounds = None;

        for attr in attr_regex().captures_iter(attrs_raw.as_str()) {
            let value = attr.get(2).map(|m| m.as_str());
            match &attr[1] {
                "clickable" => clickable = value == Some("true"),
                "enabled" => enabled = value == Some("true"),
                "visible-to-user" => visible = value == Some("true"),
                "text" => text = non_empty(value),
                "content-desc" => description = non_empty(value),
                "class" => class_name = non_empty(value),
                "bounds" => bounds = value.and_then(parse_bounds),
                _ => {}
            }
        }

        if !(clickable && enabled && visible) {
            continue;
        }

        let element = ElementHandle {
            bounds: bounds.unwrap_or_default(),
            text,
            description,
            class_name,
        };

        if filter.matches(&element, screen) {
            elements.push(element);
            if elements.len() >= filter.max_results {
                break;
            }
        }
    }

    elements
}
