//! Interactive prompt driving the store.
//!
//! One command per line. App names may contain spaces, so everything after
//! the command word is the argument.

use crate::pages::{details, grid};
use log::{error, info, warn};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tiwut_store::{AppRecord, CatalogService, StoreError, UninstallOutcome};

const HELP: &str = "\
Commands:
  library [search]     all apps in the catalog
  installed [search]   apps installed on this machine
  show <app>           details for one app
  website <app>        open the app's website in the browser
  install <app>        download and unpack an app
  uninstall <app>      remove an installed app
  launch <app>         start an installed app
  shortcut <app>       link an installed app to the desktop
  reload               fetch the catalog again
  help                 this text
  quit                 leave the launcher";

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Library(String),
    Installed(String),
    Show(String),
    Website(String),
    Install(String),
    Uninstall(String),
    Launch(String),
    Shortcut(String),
    Reload,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    let (word, arg) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim().to_string()),
        None => (line, String::new()),
    };

    match word.to_lowercase().as_str() {
        "" => Command::Empty,
        "library" | "discover" | "ls" => Command::Library(arg),
        "installed" => Command::Installed(arg),
        "show" | "info" => Command::Show(arg),
        "website" | "web" => Command::Website(arg),
        "install" => Command::Install(arg),
        "uninstall" | "remove" => Command::Uninstall(arg),
        "launch" | "open" | "run" => Command::Launch(arg),
        "shortcut" => Command::Shortcut(arg),
        "reload" => Command::Reload,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        _ => Command::Unknown(word.to_string()),
    }
}

/// Exact name first, then a case-insensitive match.
fn lookup(store: &CatalogService, name: &str) -> Option<AppRecord> {
    store.find_app(name).or_else(|| {
        store
            .all_apps()
            .into_iter()
            .find(|app| app.name.eq_ignore_ascii_case(name))
    })
}

fn confirm(input: &mut impl BufRead, question: &str) -> bool {
    print!("{} [y/N] ", question);
    if io::stdout().flush().is_err() {
        return false;
    }

    let mut answer = String::new();
    match input.read_line(&mut answer) {
        Ok(_) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

/// Hand the app's website to `opener` and describe what happened.
fn open_website(app: &AppRecord, opener: impl FnOnce(&str) -> io::Result<()>) -> String {
    if !app.has_website() {
        return "No website provided for this application.".to_string();
    }

    info!("Opening {} in the browser", app.website_url);
    match opener(&app.website_url) {
        Ok(()) => format!("Opened {}.", app.website_url),
        Err(e) => {
            error!("Failed to open {}: {}", app.website_url, e);
            format!("Could not open website: {}", e)
        }
    }
}

/// Run the prompt until `quit` or end of input.
pub fn run(store: &Arc<CatalogService>, input: &mut impl BufRead) -> io::Result<()> {
    println!("{}\n", HELP);
    show_grid(store, "Discover New Apps", store.all_apps());

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            break;
        }

        let command = parse_command(&line);
        if command == Command::Quit {
            break;
        }

        let needs_app = match &command {
            Command::Show(name)
            | Command::Website(name)
            | Command::Install(name)
            | Command::Uninstall(name)
            | Command::Launch(name)
            | Command::Shortcut(name) => Some(name.as_str()),
            _ => None,
        };
        let app = match needs_app {
            Some("") => {
                println!("Which app? Try `help`.");
                continue;
            }
            Some(name) => match lookup(store, name) {
                Some(app) => Some(app),
                None => {
                    println!("{}", StoreError::UnknownApp(name.to_string()));
                    continue;
                }
            },
            None => None,
        };

        match (command, app) {
            (Command::Library(term), _) => show_grid(store, "Discover New Apps", store.search(&term)),
            (Command::Installed(term), _) => {
                show_grid(store, "My Installed Apps", store.search_installed(&term))
            }
            (Command::Show(_), Some(app)) => {
                let icon = store.icon(&app);
                print!(
                    "{}",
                    details::render(&details::Details {
                        app: &app,
                        installed: store.is_installed(&app),
                        icon: icon.as_ref(),
                    })
                );
            }
            (Command::Website(_), Some(app)) => {
                println!("{}", open_website(&app, |url| open::that(url)));
            }
            (Command::Install(_), Some(app)) => {
                if store.is_installed(&app) {
                    println!("{} is already installed.", app.name);
                    continue;
                }
                match store.install(&app) {
                    Ok(_handle) => println!("Installing {}...", app.name),
                    Err(e) => println!("Error: {}", e),
                }
            }
            (Command::Uninstall(_), Some(app)) => {
                let question = format!("Uninstall {}?", app.name);
                match store.uninstall(&app, |_| confirm(&mut *input, &question)) {
                    Ok(UninstallOutcome::Removed) => println!("{} was uninstalled.", app.name),
                    Ok(UninstallOutcome::Cancelled) => {}
                    Err(e) => {
                        error!("Uninstalling {} failed: {}", app.name, e);
                        println!("Failed to uninstall: {}", e);
                    }
                }
            }
            (Command::Launch(_), Some(app)) => {
                if let Err(e) = store.launch(&app) {
                    warn!("Launching {} failed: {}", app.name, e);
                    println!("Error: {}", e);
                }
            }
            (Command::Shortcut(_), Some(app)) => match store.create_shortcut(&app) {
                Ok(path) => println!("Shortcut for {} created at {}.", app.name, path.display()),
                Err(e) => println!("Could not create shortcut: {}", e),
            },
            (Command::Reload, _) => {
                if let Err(e) = store.load_catalog() {
                    println!("Could not load app library: {}", e);
                }
            }
            (Command::Help, _) => println!("{}", HELP),
            (Command::Unknown(word), _) => println!("Unknown command `{}`. Try `help`.", word),
            _ => {}
        }
    }

    Ok(())
}

/// Print a grid and start loading icons for what is on screen.
fn show_grid(store: &Arc<CatalogService>, title: &str, apps: Vec<AppRecord>) {
    print!("{}", grid::render(title, &apps, |app| store.is_installed(app)));
    for app in &apps {
        let _ = store.request_icon(app);
    }
}
