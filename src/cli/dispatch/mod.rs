//! Maps validated CLI matches to the action the binary runs.

use anyhow::{anyhow, Context, Result};
use clap::ArgMatches;
use secrecy::SecretString;

use crate::auth::{AdminAccount, HashingConfig, Validity};
use crate::cli::actions::{manage, server, Action};
use crate::cli::commands::{manage as manage_args, server as server_args, ARG_DSN};

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &ArgMatches) -> Result<Action> {
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;

    let Some((name, sub)) = matches.subcommand() else {
        return Err(anyhow!("missing subcommand"));
    };

    if name == server_args::SUBCOMMAND {
        return Ok(Action::Server(server_command(dsn, sub)?));
    }

    let command = match name {
        manage_args::CREATE_SUPERUSER => manage::Command::CreateSuperuser(AdminAccount {
            username: string_arg(sub, manage_args::ARG_USERNAME)?,
            email: string_arg(sub, manage_args::ARG_EMAIL)?,
            password: SecretString::from(string_arg(sub, manage_args::ARG_PASSWORD)?),
        }),
        manage_args::LIST_USERS => manage::Command::ListUsers,
        manage_args::CLEAN_USERS => manage::Command::CleanUsers {
            yes: sub.get_flag(manage_args::ARG_YES),
        },
        manage_args::GENERATE_CODE => manage::Command::GenerateCode {
            created_by: sub
                .get_one::<i64>(manage_args::ARG_CREATED_BY)
                .copied()
                .unwrap_or(1),
            validity: if sub.get_flag(manage_args::ARG_NEVER_EXPIRES) {
                Validity::NeverExpires
            } else {
                sub.get_one::<i64>(manage_args::ARG_VALID_DAYS)
                    .copied()
                    .map_or_else(Validity::default, Validity::days)
            },
        },
        manage_args::LIST_CODES => manage::Command::ListCodes,
        other => return Err(anyhow!("unknown subcommand: {other}")),
    };

    Ok(Action::Manage { dsn, command })
}

fn server_command(dsn: String, sub: &ArgMatches) -> Result<server::Args> {
    let defaults = HashingConfig::default();
    let admin = match sub.get_one::<String>(server_args::ARG_ADMIN_PASSWORD) {
        Some(password) => Some(AdminAccount {
            username: string_arg(sub, server_args::ARG_ADMIN_USERNAME)?,
            email: string_arg(sub, server_args::ARG_ADMIN_EMAIL)?,
            password: SecretString::from(password.clone()),
        }),
        None => None,
    };
    Ok(server::Args {
        port: sub
            .get_one::<u16>(server_args::ARG_PORT)
            .copied()
            .unwrap_or(8080),
        dsn,
        session_ttl_seconds: sub
            .get_one::<i64>(server_args::ARG_SESSION_TTL_SECONDS)
            .copied()
            .unwrap_or(86_400),
        session_sweep_seconds: sub
            .get_one::<u64>(server_args::ARG_SESSION_SWEEP_SECONDS)
            .copied()
            .unwrap_or(300),
        cookie_secure: sub.get_flag(server_args::ARG_COOKIE_SECURE),
        hashing: HashingConfig {
            memory_kib: sub
                .get_one::<u32>(server_args::ARG_HASH_MEMORY_KIB)
                .copied()
                .unwrap_or(defaults.memory_kib),
            iterations: sub
                .get_one::<u32>(server_args::ARG_HASH_ITERATIONS)
                .copied()
                .unwrap_or(defaults.iterations),
            parallelism: sub
                .get_one::<u32>(server_args::ARG_HASH_PARALLELISM)
                .copied()
                .unwrap_or(defaults.parallelism),
        },
        admin,
    })
}

fn string_arg(matches: &ArgMatches, id: &str) -> Result<String> {
    matches
        .get_one::<String>(id)
        .cloned()
        .with_context(|| format!("missing required argument: --{id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn dispatch(args: &[&str]) -> Result<Action> {
        let mut argv = vec!["ghostpost"];
        argv.extend_from_slice(args);
        let matches = crate::cli::commands::new().get_matches_from(argv);
        handler(&matches)
    }

    #[test]
    fn dsn_is_required() {
        temp_env::with_vars_unset(["GHOSTPOST_DSN", "GHOSTPOST_LOG_LEVEL"], || {
            let err = dispatch(&["listusers"]).unwrap_err();
            assert!(err
                .to_string()
                .contains("missing required argument: --dsn"));
        });
    }

    #[test]
    fn server_args_are_collected() {
        temp_env::with_vars_unset(["GHOSTPOST_PORT", "GHOSTPOST_LOG_LEVEL"], || {
            let action = dispatch(&[
                "--dsn",
                "memory://",
                "server",
                "--cookie-secure",
                "--hash-iterations",
                "3",
                "--session-ttl-seconds",
                "120",
            ])
            .unwrap();
            let Action::Server(args) = action else {
                panic!("expected server action");
            };
            assert_eq!(args.dsn, "memory://");
            assert_eq!(args.port, 8080);
            assert!(args.cookie_secure);
            assert_eq!(args.session_ttl_seconds, 120);
            assert_eq!(args.hashing.iterations, 3);
            assert_eq!(
                args.hashing.memory_kib,
                HashingConfig::default().memory_kib
            );
        });
    }

    #[test]
    fn server_admin_is_optional() {
        temp_env::with_vars_unset(
            [
                "GHOSTPOST_LOG_LEVEL",
                "GHOSTPOST_ADMIN_USERNAME",
                "GHOSTPOST_ADMIN_EMAIL",
                "GHOSTPOST_ADMIN_PASSWORD",
            ],
            || {
                let Action::Server(args) = dispatch(&["--dsn", "memory://", "server"]).unwrap()
                else {
                    panic!("expected server action");
                };
                assert!(args.admin.is_none());

                let Action::Server(args) = dispatch(&[
                    "--dsn",
                    "memory://",
                    "server",
                    "--admin-email",
                    "ops@example.com",
                    "--admin-password",
                    "hunter22",
                ])
                .unwrap() else {
                    panic!("expected server action");
                };
                let admin = args.admin.unwrap();
                assert_eq!(admin.username, "admin");
                assert_eq!(admin.email, "ops@example.com");
                assert_eq!(admin.password.expose_secret(), "hunter22");
            },
        );
    }

    #[test]
    fn generate_code_validity() {
        temp_env::with_vars_unset(["GHOSTPOST_LOG_LEVEL"], || {
            let action = dispatch(&["--dsn", "memory://", "generatecode"]).unwrap();
            let Action::Manage {
                command: manage::Command::GenerateCode {
                    created_by,
                    validity,
                },
                ..
            } = action
            else {
                panic!("expected generatecode");
            };
            assert_eq!(created_by, 1);
            assert_eq!(validity, Validity::days(30));

            let action =
                dispatch(&["--dsn", "memory://", "generatecode", "--never-expires"]).unwrap();
            let Action::Manage {
                command: manage::Command::GenerateCode { validity, .. },
                ..
            } = action
            else {
                panic!("expected generatecode");
            };
            assert_eq!(validity, Validity::NeverExpires);
        });
    }

    #[test]
    fn create_superuser_carries_the_password() {
        temp_env::with_vars_unset(["GHOSTPOST_LOG_LEVEL"], || {
            let action = dispatch(&[
                "--dsn",
                "memory://",
                "createsuperuser",
                "--username",
                "root",
                "--password",
                "hunter22",
            ])
            .unwrap();
            let Action::Manage {
                command: manage::Command::CreateSuperuser(account),
                ..
            } = action
            else {
                panic!("expected createsuperuser");
            };
            assert_eq!(account.username, "root");
            assert_eq!(account.password.expose_secret(), "hunter22");
        });
    }
}
