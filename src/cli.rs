use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "hpm", version)]
#[command(about = "Install, remove and discover plugins for the Hyper terminal")]
#[command(arg_required_else_help = true)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub(crate) enum Commands {
    /// Install a plugin
    #[command(visible_alias = "i")]
    Install { plugin: String },
    /// Uninstall a plugin
    #[command(visible_aliases = ["u", "uni", "rm", "remove"])]
    Uninstall { plugin: String },
    /// List installed plugins
    #[command(visible_alias = "ls")]
    List,
    /// Search for plugins on npm
    #[command(visible_alias = "s")]
    Search { query: Option<String> },
    /// List plugins available on npm
    #[command(visible_aliases = ["lsr", "ls-remote"])]
    ListRemote,
    /// Open the npm page of a plugin
    #[command(visible_aliases = ["d", "home", "h"])]
    Docs { plugin: String },
    /// Fork a plugin from npm into your local plugins directory
    #[command(visible_alias = "f")]
    Fork { plugin: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Commands {
        Cli::try_parse_from(std::iter::once("hpm").chain(args.iter().copied()))
            .unwrap()
            .command
    }

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn aliases_resolve_to_commands() {
        let install = Commands::Install {
            plugin: "hyperpower".into(),
        };
        assert_eq!(parse(&["install", "hyperpower"]), install);
        assert_eq!(parse(&["i", "hyperpower"]), install);

        for alias in ["uninstall", "u", "uni", "rm", "remove"] {
            assert_eq!(
                parse(&[alias, "hyperpower"]),
                Commands::Uninstall {
                    plugin: "hyperpower".into()
                }
            );
        }
        for alias in ["list-remote", "lsr", "ls-remote"] {
            assert_eq!(parse(&[alias]), Commands::ListRemote);
        }
        for alias in ["docs", "d", "home", "h"] {
            assert!(matches!(parse(&[alias, "x"]), Commands::Docs { .. }));
        }
        assert_eq!(parse(&["ls"]), Commands::List);
        assert_eq!(
            parse(&["f", "hyper-x"]),
            Commands::Fork {
                plugin: "hyper-x".into()
            }
        );
    }

    #[test]
    fn search_query_is_optional() {
        assert_eq!(parse(&["search"]), Commands::Search { query: None });
        assert_eq!(
            parse(&["s", "theme"]),
            Commands::Search {
                query: Some("theme".into())
            }
        );
    }

    #[test]
    fn missing_plugin_argument_is_rejected() {
        assert!(Cli::try_parse_from(["hpm", "install"]).is_err());
        assert!(Cli::try_parse_from(["hpm"]).is_err());
    }
}
