//! Command-line parsing for the `storyreel` binary.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

pub const USAGE: &str = "\
usage: storyreel [--config PATH] [--project NAME] [--chapter NAME] <command> [options]

commands:
  images    --prompts FILE [--workflow NAME]   generate one image per prompt
  audio     --prompts FILE                     generate one audio clip per prompt
  produce   (--from-scenes | --images FILE --audio FILE) [--workflow NAME] [--no-video]
                                               images, then audio, then the video
  video     [--output FILE]                    assemble the chapter video
  scenes                                       list the chapter's scenes
  chapter   --prompt TEXT [--continue] [--no-last-chapter]
                                               stream chapter text to stdout
  cancel    --task ID                          cancel a running backend task
  workflows                                    list available image workflows

Prompt files are RON lists: [(id: \"1\", prompt: \"a harbor at dawn\")]
Ctrl-C stops a job or a chapter stream; a second Ctrl-C abandons the job.";

const GLOBAL_OPTIONS: &[&str] = &["--config", "--project", "--chapter"];

/// Each command with the value options and flags it accepts after its name.
type CommandOptions = (&'static str, &'static [&'static str], &'static [&'static str]);

#[rustfmt::skip]
const COMMANDS: &[CommandOptions] = &[
    ("images", &["--prompts", "--workflow"], &[]),
    ("audio", &["--prompts"], &[]),
    ("produce", &["--images", "--audio", "--workflow"], &["--from-scenes", "--no-video"]),
    ("video", &["--output"], &[]),
    ("scenes", &[], &[]),
    ("chapter", &["--prompt"], &["--continue", "--no-last-chapter"]),
    ("cancel", &["--task"], &[]),
    ("workflows", &[], &[]),
    ("help", &[], &[]),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub config_path: Option<PathBuf>,
    pub project: Option<String>,
    pub chapter: Option<String>,
    pub command: Command,
}

/// Where `produce` takes its prompt batches from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptSource {
    /// Image prompts and narration from the chapter's scene list.
    Scenes,
    Files { images: PathBuf, audio: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Images {
        prompts: PathBuf,
        workflow: Option<String>,
    },
    Audio {
        prompts: PathBuf,
    },
    Produce {
        source: PromptSource,
        workflow: Option<String>,
        video: bool,
    },
    Video {
        output: Option<PathBuf>,
    },
    Scenes,
    Chapter {
        prompt: String,
        continuation: bool,
        use_last_chapter: bool,
    },
    Cancel {
        task_id: String,
    },
    Workflows,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgsError {
    #[error("no command given")]
    MissingCommand,
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    #[error("unexpected argument `{0}`")]
    UnexpectedArgument(String),
    #[error("unknown option `{0}`")]
    UnknownOption(String),
    #[error("option `{0}` needs a value")]
    MissingValue(String),
    #[error("option `{0}` given more than once")]
    DuplicateOption(String),
    #[error("`{command}` requires `{option}`")]
    MissingRequired {
        command: &'static str,
        option: &'static str,
    },
    #[error("`{0}` cannot be combined with `{1}`")]
    Conflict(&'static str, &'static str),
}

#[derive(Default)]
struct RawArgs {
    values: HashMap<&'static str, String>,
    flags: HashSet<&'static str>,
}

impl RawArgs {
    fn take(&mut self, option: &str) -> Option<String> {
        self.values.remove(option)
    }

    fn require(&mut self, command: &'static str, option: &'static str) -> Result<String, ArgsError> {
        self.take(option)
            .ok_or(ArgsError::MissingRequired { command, option })
    }

    fn flag(&self, option: &str) -> bool {
        self.flags.contains(option)
    }
}

/// Parses everything after the program name.
///
/// Global options may appear anywhere; command options only after the
/// command name.
pub fn parse<I, S>(args: I) -> Result<Invocation, ArgsError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut args = args.into_iter().map(Into::into);
    let mut command: Option<&'static CommandOptions> = None;
    let mut raw = RawArgs::default();
    let mut help = false;

    while let Some(arg) = args.next() {
        if arg == "-h" || arg == "--help" {
            help = true;
            continue;
        }
        if !arg.starts_with("--") {
            if command.is_some() {
                return Err(ArgsError::UnexpectedArgument(arg));
            }
            command = Some(
                COMMANDS
                    .iter()
                    .find(|(command, _, _)| *command == arg)
                    .ok_or(ArgsError::UnknownCommand(arg))?,
            );
            continue;
        }

        let (name, inline) = match arg.split_once('=') {
            Some((name, value)) => (name.to_string(), Some(value.to_string())),
            None => (arg, None),
        };
        let (values, flags) = command.map_or((&[][..], &[][..]), |(_, values, flags)| (*values, *flags));
        if let Some(flag) = flags.iter().find(|flag| **flag == name) {
            if inline.is_some() {
                return Err(ArgsError::UnexpectedArgument(format!("{name}=...")));
            }
            raw.flags.insert(*flag);
            continue;
        }
        let Some(option) = GLOBAL_OPTIONS
            .iter()
            .chain(values)
            .find(|option| **option == name)
        else {
            return Err(ArgsError::UnknownOption(name));
        };
        let value = match inline {
            Some(value) => value,
            None => args.next().ok_or_else(|| ArgsError::MissingValue(name.clone()))?,
        };
        if raw.values.insert(*option, value).is_some() {
            return Err(ArgsError::DuplicateOption(name));
        }
    }

    let command = if help {
        Command::Help
    } else {
        build_command(command.ok_or(ArgsError::MissingCommand)?.0, &mut raw)?
    };
    Ok(Invocation {
        config_path: raw.take("--config").map(PathBuf::from),
        project: raw.take("--project"),
        chapter: raw.take("--chapter"),
        command,
    })
}

fn build_command(name: &'static str, raw: &mut RawArgs) -> Result<Command, ArgsError> {
    Ok(match name {
        "images" => Command::Images {
            prompts: raw.require(name, "--prompts")?.into(),
            workflow: raw.take("--workflow"),
        },
        "audio" => Command::Audio {
            prompts: raw.require(name, "--prompts")?.into(),
        },
        "produce" => {
            let source = if raw.flag("--from-scenes") {
                for option in ["--images", "--audio"] {
                    if raw.values.contains_key(option) {
                        return Err(ArgsError::Conflict("--from-scenes", option));
                    }
                }
                PromptSource::Scenes
            } else {
                PromptSource::Files {
                    images: raw.require(name, "--images")?.into(),
                    audio: raw.require(name, "--audio")?.into(),
                }
            };
            Command::Produce {
                source,
                workflow: raw.take("--workflow"),
                video: !raw.flag("--no-video"),
            }
        }
        "video" => Command::Video {
            output: raw.take("--output").map(PathBuf::from),
        },
        "scenes" => Command::Scenes,
        "chapter" => Command::Chapter {
            prompt: raw.require(name, "--prompt")?,
            continuation: raw.flag("--continue"),
            use_last_chapter: !raw.flag("--no-last-chapter"),
        },
        "cancel" => Command::Cancel {
            task_id: raw.require(name, "--task")?,
        },
        "workflows" => Command::Workflows,
        _ => Command::Help,
    })
}
