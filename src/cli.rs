use crate::{
    app::App,
    bridge::{local::LocalBackend, Client},
    cache::QueryCache,
    config::{self, AppConfig},
    game::GameId,
    keybind,
    logging,
    panel::PreviewPanel,
    store::SelectionStore,
    ui,
};
use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "json" => Some(OutputFormat::Json),
            "text" => Some(OutputFormat::Text),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct GlobalOptions {
    format: OutputFormat,
    game: Option<GameId>,
}

#[derive(Debug)]
enum CliAction {
    Ui,
    Command {
        command: CliCommand,
        format: OutputFormat,
        game: Option<GameId>,
    },
}

#[derive(Debug, PartialEq, Eq)]
enum CliCommand {
    ModsList(ModsListOptions),
    KeybindsList { folder: String },
    KeybindsSet { folder: String, field_id: String, value: String },
    Random { apply: bool },
    PinSet(String),
    PinClear,
    Help,
    Version,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ModsListOptions {
    sort: ModSortKey,
    reverse: bool,
    filter: Option<String>,
    sub_path: Option<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum ModSortKey {
    #[default]
    Name,
    Enabled,
    Favorite,
}

pub fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let action = parse_args(&args)?;
    // Installed before config and backend setup so their events are kept.
    let _guard = if action.wants_tracing() {
        start_tracing()
    } else {
        None
    };
    match action {
        CliAction::Ui => {
            let mut app = App::initialize()?;
            tracing::info!(game = app.nav.game_id.as_str(), "starting ui");
            ui::run(&mut app)
        }
        CliAction::Command {
            command,
            format,
            game,
        } => match command {
            CliCommand::Help => {
                print_help();
                Ok(())
            }
            CliCommand::Version => {
                println!("modnest v{}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
            command => {
                let mut config = AppConfig::load_or_create()?;
                if let Some(game) = game {
                    config.active_game = game;
                }
                run_command(&mut config, command, format)
            }
        },
    }
}

impl CliAction {
    fn wants_tracing(&self) -> bool {
        !matches!(
            self,
            CliAction::Command {
                command: CliCommand::Help | CliCommand::Version,
                ..
            }
        )
    }
}

/// Tracing is best effort; a broken log dir must not keep the tool from running.
fn start_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    match config::base_data_dir().and_then(|dir| logging::init(&dir)) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("tracing disabled: {err:#}");
            None
        }
    }
}

fn parse_args(args: &[String]) -> Result<CliAction> {
    if args.is_empty() {
        return Ok(CliAction::Ui);
    }

    if matches!(args.first().map(|s| s.as_str()), Some("--help" | "-h" | "help")) {
        return Ok(plain(CliCommand::Help));
    }
    if matches!(args.first().map(|s| s.as_str()), Some("--version" | "-V" | "version")) {
        return Ok(plain(CliCommand::Version));
    }

    let (global, tokens) = parse_global_options(args)?;
    if let Some(command) = parse_subcommand(&tokens)? {
        return Ok(CliAction::Command {
            command,
            format: global.format,
            game: global.game,
        });
    }

    Ok(plain(CliCommand::Help))
}

fn plain(command: CliCommand) -> CliAction {
    CliAction::Command {
        command,
        format: OutputFormat::Text,
        game: None,
    }
}

fn parse_global_options(args: &[String]) -> Result<(GlobalOptions, Vec<String>)> {
    let mut format = OutputFormat::Text;
    let mut game = None;
    let mut tokens = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--json" {
            format = OutputFormat::Json;
            continue;
        }
        if let Some(value) = arg.strip_prefix("--format=") {
            format = OutputFormat::parse(value).ok_or_else(|| anyhow!("Unknown format: {value}"))?;
            continue;
        }
        if arg == "--format" {
            let value = iter.next().ok_or_else(|| anyhow!("--format requires a value"))?;
            format = OutputFormat::parse(value).ok_or_else(|| anyhow!("Unknown format: {value}"))?;
            continue;
        }
        let game_value = if let Some(value) = arg.strip_prefix("--game=") {
            Some(value.to_string())
        } else if arg == "--game" {
            Some(
                iter.next()
                    .ok_or_else(|| anyhow!("--game requires a value"))?
                    .to_string(),
            )
        } else {
            None
        };
        if let Some(value) = game_value {
            game = Some(GameId::parse(&value).ok_or_else(|| anyhow!("Unknown game: {value}"))?);
            continue;
        }
        tokens.push(arg.to_string());
    }

    Ok((GlobalOptions { format, game }, tokens))
}

fn parse_subcommand(tokens: &[String]) -> Result<Option<CliCommand>> {
    let Some(head) = tokens.first() else {
        return Ok(None);
    };
    let rest = tokens.get(1..).unwrap_or(&[]);
    match head.as_str() {
        "mods" => Ok(Some(CliCommand::ModsList(parse_mods_list(rest)?))),
        "keybinds" => match rest {
            [set, folder, field_id, value] if set == "set" => Ok(Some(CliCommand::KeybindsSet {
                folder: folder.to_string(),
                field_id: field_id.to_string(),
                value: value.to_string(),
            })),
            [set, ..] if set == "set" => {
                bail!("usage: keybinds set <folder> <field-id> <value>")
            }
            [folder] => Ok(Some(CliCommand::KeybindsList {
                folder: folder.to_string(),
            })),
            _ => bail!("usage: keybinds <folder>"),
        },
        "random" => {
            let apply = rest.iter().any(|arg| arg == "--apply");
            Ok(Some(CliCommand::Random { apply }))
        }
        "pin" => match rest {
            [set, pin] if set == "set" => {
                if pin.trim().is_empty() {
                    bail!("PIN cannot be empty");
                }
                Ok(Some(CliCommand::PinSet(pin.to_string())))
            }
            [clear] if clear == "clear" => Ok(Some(CliCommand::PinClear)),
            _ => bail!("usage: pin set <pin> | pin clear"),
        },
        _ => Ok(None),
    }
}

fn parse_mods_list(args: &[String]) -> Result<ModsListOptions> {
    let mut options = ModsListOptions::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "list" => {}
            "--sort" => {
                let value = iter.next().ok_or_else(|| anyhow!("--sort requires a value"))?;
                options.sort = parse_sort_key(value)?;
            }
            value if value.starts_with("--sort=") => {
                options.sort = parse_sort_key(value.trim_start_matches("--sort="))?;
            }
            "--reverse" | "-r" => options.reverse = true,
            "--filter" => {
                let value = iter.next().ok_or_else(|| anyhow!("--filter requires a value"))?;
                options.filter = Some(value.to_string());
            }
            value if value.starts_with("--filter=") => {
                options.filter = Some(value.trim_start_matches("--filter=").to_string());
            }
            "--in" => {
                let value = iter.next().ok_or_else(|| anyhow!("--in requires a folder"))?;
                options.sub_path = Some(value.to_string());
            }
            other => bail!("Unknown mods option: {other}"),
        }
    }
    Ok(options)
}

fn parse_sort_key(value: &str) -> Result<ModSortKey> {
    match value {
        "name" => Ok(ModSortKey::Name),
        "enabled" => Ok(ModSortKey::Enabled),
        "favorite" => Ok(ModSortKey::Favorite),
        _ => bail!("Unknown sort key: {value}"),
    }
}

fn run_command(config: &mut AppConfig, command: CliCommand, format: OutputFormat) -> Result<()> {
    let client = Client::new(Arc::new(LocalBackend::from_config(config)));
    match command {
        CliCommand::ModsList(options) => list_mods(config, &client, options, format),
        CliCommand::KeybindsList { folder } => {
            let folder = resolve_folder(config, &folder)?;
            list_keybinds(&client, &folder, format)
        }
        CliCommand::KeybindsSet {
            folder,
            field_id,
            value,
        } => {
            let folder = resolve_folder(config, &folder)?;
            set_keybind(&client, &folder, &field_id, value)
        }
        CliCommand::Random { apply } => random_mods(config, &client, apply, format),
        CliCommand::PinSet(pin) => {
            config.set_pin(Some(&pin));
            config.save()?;
            println!("PIN set");
            Ok(())
        }
        CliCommand::PinClear => {
            config.set_pin(None);
            config.save()?;
            println!("PIN cleared");
            Ok(())
        }
        CliCommand::Help | CliCommand::Version => Ok(()),
    }
}

fn mods_root(config: &AppConfig) -> Result<PathBuf> {
    config.mods_path(config.active_game).ok_or_else(|| {
        anyhow!(
            "No mods folder set for {}; run the TUI and press M",
            config.active_game.display_name()
        )
    })
}

/// Accepts an absolute folder or one relative to the active game's mods root.
fn resolve_folder(config: &AppConfig, folder: &str) -> Result<PathBuf> {
    let path = Path::new(folder);
    let resolved = if path.is_absolute() {
        path.to_path_buf()
    } else {
        mods_root(config)?.join(path)
    };
    if !resolved.is_dir() {
        bail!("Mod folder not found: {}", resolved.display());
    }
    Ok(resolved)
}

#[derive(Serialize)]
struct ModListItem {
    name: String,
    folder_name: String,
    path: PathBuf,
    enabled: bool,
    favorite: bool,
    safe: bool,
}

fn list_mods(
    config: &AppConfig,
    client: &Client,
    options: ModsListOptions,
    format: OutputFormat,
) -> Result<()> {
    let root = mods_root(config)?;
    let folders = client
        .list_mod_folders(config.active_game, &root, options.sub_path.as_deref(), None)
        .context("list mod folders")?;

    let mut items: Vec<ModListItem> = folders
        .into_iter()
        .filter(|folder| !config.safe_mode || folder.is_safe)
        .map(|folder| ModListItem {
            name: folder.name,
            folder_name: folder.folder_name,
            path: folder.path,
            enabled: folder.enabled,
            favorite: folder.is_favorite,
            safe: folder.is_safe,
        })
        .collect();

    if let Some(filter) = &options.filter {
        let needle = filter.to_lowercase();
        items.retain(|item| item.name.to_lowercase().contains(&needle));
    }

    match options.sort {
        ModSortKey::Name => items.sort_by_key(|item| item.name.to_lowercase()),
        ModSortKey::Enabled => items.sort_by_key(|item| (!item.enabled, item.name.to_lowercase())),
        ModSortKey::Favorite => {
            items.sort_by_key(|item| (!item.favorite, item.name.to_lowercase()))
        }
    }
    if options.reverse {
        items.reverse();
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&items)?),
        OutputFormat::Text => {
            for item in items {
                let enabled = if item.enabled { "x" } else { " " };
                let favorite = if item.favorite { "*" } else { " " };
                println!("[{enabled}]{favorite} {}", item.name);
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct KeybindItem {
    id: String,
    file: String,
    section: String,
    label: String,
    line: usize,
    value: String,
}

fn list_keybinds(client: &Client, folder: &Path, format: OutputFormat) -> Result<()> {
    let mut documents = Vec::new();
    for file in client.list_mod_ini_files(folder)? {
        documents.push(
            client
                .read_mod_ini(folder, &file.filename)
                .with_context(|| format!("read {}", file.filename))?,
        );
    }
    let groups = keybind::build_key_bind_sections(&documents);
    let items: Vec<KeybindItem> = keybind::flatten_fields(&groups)
        .into_iter()
        .map(|field| KeybindItem {
            id: field.id,
            file: field.file_name,
            section: field.section_name,
            label: field.label,
            line: field.line_idx + 1,
            value: field.value,
        })
        .collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&items)?),
        OutputFormat::Text => {
            if items.is_empty() {
                println!("No editable keybinds in {}", folder.display());
            }
            let mut current = String::new();
            for item in items {
                let heading = format!("{} [{}]", item.file, item.section);
                if heading != current {
                    println!("{heading}");
                    current = heading;
                }
                println!("  {:<12} = {:<16} {}", item.label, item.value, item.id);
            }
        }
    }
    Ok(())
}

/// Goes through the same save path as the editor so validation and
/// per-file batching match.
fn set_keybind(client: &Client, folder: &Path, field_id: &str, value: String) -> Result<()> {
    let mut cache = QueryCache::default();
    let mut selection = SelectionStore::default();
    selection.select_only(folder);
    let mut panel = PreviewPanel::default();
    panel.sync_selection(&mut selection, client, &mut cache)?;

    if !panel.edit_field(field_id, value) {
        bail!("No keybind field {field_id} in {}", folder.display());
    }
    let summary = panel.save(client, &mut cache)?;
    if summary.is_empty() {
        println!("Unchanged");
    } else {
        println!("Updated {field_id}");
    }
    Ok(())
}

#[derive(Serialize)]
struct RandomItem {
    object: String,
    name: String,
    path: PathBuf,
    applied: bool,
}

fn random_mods(config: &AppConfig, client: &Client, apply: bool, format: OutputFormat) -> Result<()> {
    let game = config.active_game;
    let proposals = client.suggest_random_mods(game, config.safe_mode)?;
    let mut items = Vec::new();
    for proposal in proposals {
        let applied = if apply {
            client
                .enable_only_this(game, &proposal.path)
                .with_context(|| format!("enable {}", proposal.name))?;
            true
        } else {
            false
        };
        items.push(RandomItem {
            object: proposal.object_name,
            name: proposal.name,
            path: proposal.path,
            applied,
        });
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&items)?),
        OutputFormat::Text => {
            if items.is_empty() {
                println!("Nothing to randomize");
            }
            for item in &items {
                let mark = if item.applied { "enabled" } else { "suggest" };
                println!("{mark:<8} {:<20} {}", item.object, item.name);
            }
        }
    }
    Ok(())
}

fn print_help() {
    println!("modnest v{}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  modnest                                    Launch TUI");
    println!("  modnest mods list [--filter <text>]        List mod folders");
    println!("        [--sort name|enabled|favorite] [--reverse] [--in <sub folder>]");
    println!("  modnest keybinds <folder>                  List editable keybinds");
    println!("  modnest keybinds set <folder> <id> <value> Change one keybind value");
    println!("  modnest random [--apply]                   Suggest (or enable) one mod per object");
    println!("  modnest pin set <pin> | pin clear          Protect leaving safe mode with a PIN");
    println!();
    println!("Global options:");
    println!("  --format <json|text>, --json               Output format");
    println!("  --game <genshin|starrail|zzz|wuwa>         Game for this command");
    println!("  -h, --help                                 Show help");
    println!("  -V, --version                              Show version");
    println!();
    println!("Set MODNEST_LOG (e.g. debug) to change the trace.log level.");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn command(values: &[&str]) -> (CliCommand, OutputFormat, Option<GameId>) {
        match parse_args(&args(values)).unwrap() {
            CliAction::Command {
                command,
                format,
                game,
            } => (command, format, game),
            CliAction::Ui => panic!("expected a command"),
        }
    }

    #[test]
    fn no_args_launches_ui() {
        assert!(matches!(parse_args(&[]).unwrap(), CliAction::Ui));
    }

    #[test]
    fn mods_list_options_and_globals() {
        let (cmd, format, game) = command(&[
            "mods", "list", "--json", "--sort", "favorite", "-r", "--filter=rai", "--game", "zzz",
        ]);
        assert_eq!(format, OutputFormat::Json);
        assert_eq!(game, Some(GameId::Zenless));
        assert_eq!(
            cmd,
            CliCommand::ModsList(ModsListOptions {
                sort: ModSortKey::Favorite,
                reverse: true,
                filter: Some("rai".to_string()),
                sub_path: None,
            })
        );
    }

    #[test]
    fn keybind_commands() {
        let (cmd, _, _) = command(&["keybinds", "Raiden"]);
        assert_eq!(
            cmd,
            CliCommand::KeybindsList {
                folder: "Raiden".to_string()
            }
        );

        let (cmd, _, _) = command(&["keybinds", "set", "Raiden", "a.ini::KeySwap::key::1", "VK_F9"]);
        assert!(matches!(cmd, CliCommand::KeybindsSet { ref value, .. } if value == "VK_F9"));

        assert!(parse_args(&args(&["keybinds", "set", "Raiden"])).is_err());
    }

    #[test]
    fn random_and_pin() {
        assert_eq!(command(&["random", "--apply"]).0, CliCommand::Random { apply: true });
        assert_eq!(command(&["pin", "clear"]).0, CliCommand::PinClear);
        assert!(parse_args(&args(&["pin", "set", " "])).is_err());
    }

    #[test]
    fn rejects_unknown_values() {
        assert!(parse_args(&args(&["mods", "--sort", "size"])).is_err());
        assert!(parse_args(&args(&["mods", "--format", "xml"])).is_err());
        assert!(parse_args(&args(&["mods", "--game", "bg3"])).is_err());
    }

    #[test]
    fn tracing_starts_for_everything_but_help_and_version() {
        assert!(parse_args(&[]).unwrap().wants_tracing());
        assert!(parse_args(&args(&["mods", "list"])).unwrap().wants_tracing());
        assert!(parse_args(&args(&["random"])).unwrap().wants_tracing());
        assert!(!parse_args(&args(&["--help"])).unwrap().wants_tracing());
        assert!(!parse_args(&args(&["version"])).unwrap().wants_tracing());
    }

    #[test]
    fn unknown_subcommand_shows_help() {
        assert_eq!(command(&["frobnicate"]).0, CliCommand::Help);
    }
}
