//! Operator subcommands that work directly against the store.

use clap::{Arg, ArgAction, Command};

pub const CREATE_SUPERUSER: &str = "createsuperuser";
pub const LIST_USERS: &str = "listusers";
pub const CLEAN_USERS: &str = "cleanusers";
pub const GENERATE_CODE: &str = "generatecode";
pub const LIST_CODES: &str = "listcodes";

pub const ARG_USERNAME: &str = "username";
pub const ARG_EMAIL: &str = "email";
pub const ARG_PASSWORD: &str = "password";
pub const ARG_YES: &str = "yes";
pub const ARG_CREATED_BY: &str = "created-by";
pub const ARG_VALID_DAYS: &str = "valid-days";
pub const ARG_NEVER_EXPIRES: &str = "never-expires";

#[must_use]
pub fn subcommands() -> Vec<Command> {
    vec![
        create_superuser(),
        Command::new(LIST_USERS).about("List all users"),
        Command::new(CLEAN_USERS)
            .about("Delete every non-admin user")
            .arg(
                Arg::new(ARG_YES)
                    .long(ARG_YES)
                    .help("Confirm the deletion")
                    .action(ArgAction::SetTrue),
            ),
        generate_code(),
        Command::new(LIST_CODES).about("List all invitation codes"),
    ]
}

fn create_superuser() -> Command {
    Command::new(CREATE_SUPERUSER)
        .about("Create an admin account")
        .arg(
            Arg::new(ARG_USERNAME)
                .long(ARG_USERNAME)
                .help("Admin username")
                .default_value("admin"),
        )
        .arg(
            Arg::new(ARG_EMAIL)
                .long(ARG_EMAIL)
                .help("Admin email address")
                .default_value("admin@example.com"),
        )
        .arg(
            Arg::new(ARG_PASSWORD)
                .long(ARG_PASSWORD)
                .help("Admin password")
                .env("GHOSTPOST_ADMIN_PASSWORD")
                .hide_env_values(true)
                .required(true),
        )
}

fn generate_code() -> Command {
    Command::new(GENERATE_CODE)
        .about("Create an invitation code on behalf of an admin")
        .arg(
            Arg::new(ARG_CREATED_BY)
                .long(ARG_CREATED_BY)
                .help("Id of the admin issuing the code")
                .default_value("1")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_VALID_DAYS)
                .long(ARG_VALID_DAYS)
                .help("Days until the code expires")
                .default_value("30")
                .value_parser(clap::value_parser!(i64).range(1..=3650)),
        )
        .arg(
            Arg::new(ARG_NEVER_EXPIRES)
                .long(ARG_NEVER_EXPIRES)
                .help("Issue a code without an expiry")
                .action(ArgAction::SetTrue)
                .conflicts_with(ARG_VALID_DAYS),
        )
}
