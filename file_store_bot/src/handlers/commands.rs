use teloxide::types::BotCommand;

pub struct Command {
    /// Name as typed, including the `/`.
    pub callname: &'static str,
    pub description: &'static str,
    /// Not shown in the command list, since regular users can't use it anyway.
    pub hidden: bool,
}

pub const START: Command = Command {
    callname: "/start",
    description: "Start the bot, or get a file from a link",
    hidden: false,
};

pub const HELP: Command = Command {
    callname: "/help",
    description: "How to use this bot",
    hidden: false,
};

pub const AUTODELETE: Command = Command {
    callname: "/autodelete",
    description: "Show or set how long until sent files are deleted (admins only)",
    hidden: true,
};

pub const COMMANDS: &[Command] = &[START, HELP, AUTODELETE];

pub const HELP_TEXT: &str = concat!(
    "Admins: send a file to bot (in private) to create a shareable link.\n",
    "Users: open the provided link and join the channel to receive the file.\n\n",
    "Admins can also use /autodelete to see or change how long users get to keep their files, ",
    "like /autodelete 600 for ten minutes, or /autodelete off to keep them forever."
);

/// Commands to register with Telegram, so that they show up in the menu.
#[must_use]
pub fn generate_bot_commands() -> Vec<BotCommand> {
    COMMANDS
        .iter()
        .filter(|command| !command.hidden)
        .map(|command| {
            // Cut off the /
            BotCommand::new(&command.callname[1..], command.description)
        })
        .collect()
}
