//! Detection of the diagnostic tools available on this machine
//!
//! Ping and traceroute are external programs. Their absence is not fatal:
//! lookups still work, and each diagnostic simply reports the tool as missing.

use super::ping::PING_PROGRAM;
use super::traceroute::TRACEROUTE_PROGRAM;
use serde::Serialize;
use std::ffi::OsStr;
use std::path::PathBuf;

/// Whether one external tool was found
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStatus {
    pub program: &'static str,
    pub path: Option<PathBuf>,
}

impl ToolStatus {
    pub fn is_available(&self) -> bool {
        self.path.is_some()
    }

    /// Path to spawn: the detected location, or the bare name when the tool
    /// was not found.
    pub fn command_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.program))
    }
}

/// Diagnostics that can be run on this machine
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticCapabilities {
    pub ping: ToolStatus,
    pub traceroute: ToolStatus,
    pub warning: Option<String>,
}

impl DiagnosticCapabilities {
    fn from_tools(ping: ToolStatus, traceroute: ToolStatus) -> Self {
        let missing: Vec<&str> = [&ping, &traceroute]
            .iter()
            .filter(|t| !t.is_available())
            .map(|t| t.program)
            .collect();

        let warning = if missing.is_empty() {
            None
        } else {
            Some(format!(
                "{} not found on PATH; {}",
                missing.join(" and "),
                install_hint()
            ))
        };

        Self {
            ping,
            traceroute,
            warning,
        }
    }
}

fn install_hint() -> &'static str {
    #[cfg(target_os = "linux")]
    {
        "install them with your package manager (e.g. iputils-ping, traceroute)"
    }
    #[cfg(target_os = "macos")]
    {
        "they ship with macOS, check that /sbin and /usr/sbin are on PATH"
    }
    #[cfg(target_os = "windows")]
    {
        "they ship with Windows, check that System32 is on PATH"
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        "install them to enable --ping and --trace"
    }
}

/// Look for `program` in the directories of a PATH-style value.
pub(crate) fn find_in_path(program: &str, path_var: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(path_var).find_map(|dir| {
        let candidate = dir.join(program);
        if candidate.is_file() {
            return Some(candidate);
        }
        #[cfg(target_os = "windows")]
        {
            let exe = dir.join(format!("{}.exe", program));
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}

fn locate(program: &'static str) -> ToolStatus {
    let mut search = std::env::var_os("PATH").unwrap_or_default();

    // ping and traceroute often live in sbin, which is not on every user's PATH
    #[cfg(unix)]
    {
        let mut dirs: Vec<PathBuf> = std::env::split_paths(&search).collect();
        for extra in ["/sbin", "/usr/sbin", "/usr/local/sbin"] {
            let extra = PathBuf::from(extra);
            if !dirs.contains(&extra) {
                dirs.push(extra);
            }
        }
        if let Ok(joined) = std::env::join_paths(dirs) {
            search = joined;
        }
    }

    ToolStatus {
        program,
        path: find_in_path(program, &search),
    }
}

/// Detect which diagnostic tools are installed.
pub fn detect_capabilities() -> DiagnosticCapabilities {
    let caps =
        DiagnosticCapabilities::from_tools(locate(PING_PROGRAM), locate(TRACEROUTE_PROGRAM));
    if let Some(ref warning) = caps.warning {
        tracing::debug!("Limited diagnostics: {}", warning);
    }
    caps
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "yougotmapped-caps-{}-{}",
            name,
            std::process::id()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_find_in_path() {
        let dir = scratch_dir("find");
        fs::write(dir.join("fakeping"), b"").unwrap();
        let path_var =
            std::env::join_paths([PathBuf::from("/nonexistent-dir"), dir.clone()]).unwrap();

        assert_eq!(find_in_path("fakeping", &path_var), Some(dir.join("fakeping")));
        assert_eq!(find_in_path("missing-tool", &path_var), None);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_warning_lists_missing_tools() {
        let caps = DiagnosticCapabilities::from_tools(
            ToolStatus {
                program: "ping",
                path: Some(PathBuf::from("/bin/ping")),
            },
            ToolStatus {
                program: "traceroute",
                path: None,
            },
        );
        let warning = caps.warning.unwrap();
        assert!(warning.starts_with("traceroute not found on PATH"));
    }

    #[test]
    fn test_no_warning_when_all_present() {
        let caps = DiagnosticCapabilities::from_tools(
            ToolStatus {
                program: "ping",
                path: Some(PathBuf::from("/bin/ping")),
            },
            ToolStatus {
                program: "traceroute",
                path: Some(PathBuf::from("/usr/bin/traceroute")),
            },
        );
        assert!(caps.warning.is_none());
    }
}
