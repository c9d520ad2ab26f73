use std::path::Path;
use std::process::Stdio;

use demrec_engine::Config;
use tokio::process::Command;
use tracing::info;

use crate::error::Result;
use crate::game::HijackProcess;

/// Arguments every recording session needs: console access for command
/// delivery and verbose demo diagnostics in the log.
const BASE_LAUNCH_ARGS: [&str; 3] = ["-console", "-novid", "-insecure"];

/// Launches the game through the capture companion.
///
/// The companion reads its launch parameters from an ini file in its
/// installation directory, so that file is written first and the game
/// executable is started afterwards.
pub async fn launch(config: &Config, game_dir: &Path) -> Result<HijackProcess> {
    let params = launch_params(config, game_dir);
    let params_path = config.general.svr_dir.join("svr_launch_params.ini");
    tokio::fs::write(&params_path, format!("{}\n", params.join(" "))).await?;

    info!(exe = %config.general.game_exe.display(), "launching game");
    let child = Command::new(&config.general.game_exe)
        .args(&params)
        .current_dir(game_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    Ok(HijackProcess::from_child(&config.general.game_exe, child))
}

fn launch_params(config: &Config, game_dir: &Path) -> Vec<String> {
    let mut params: Vec<String> = BASE_LAUNCH_ARGS.iter().map(|a| (*a).to_owned()).collect();
    params.push("-game".to_owned());
    params.push(game_dir.display().to_string());
    if let Some(extra) = &config.general.game_args {
        params.extend(extra.split_whitespace().map(str::to_owned));
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(game_args: Option<&str>) -> Config {
        let extra = match game_args {
            Some(args) => format!(r#", "game_args": "{args}""#),
            None => String::new(),
        };
        serde_json::from_str(&format!(
            r#"{{
                "general": {{ "svr_dir": "/opt/svr", "game_exe": "/g/hl2.exe"{extra} }}
            }}"#
        ))
        .unwrap()
    }

    #[test]
    fn launch_params_carry_game_dir_and_extras() {
        let params = launch_params(&config(Some("-w 1920 -h 1080")), Path::new("/g/tf"));
        assert_eq!(
            params,
            vec![
                "-console",
                "-novid",
                "-insecure",
                "-game",
                "/g/tf",
                "-w",
                "1920",
                "-h",
                "1080",
            ]
        );
    }

    #[test]
    fn launch_params_without_extras() {
        let params = launch_params(&config(None), Path::new("/g/tf"));
        assert_eq!(params.last().unwrap(), "/g/tf");
    }
}
