//! REPL command parsing.

use cadence_core::{ConversationId, UserId};
use cadence_expression::Bypass;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// A user message: feeds mood and activity, then evaluates a reply.
    Message {
        conv: ConversationId,
        user: UserId,
        bypass: Bypass,
        text: String,
    },
    Reply {
        conv: ConversationId,
        user: UserId,
        text: Option<String>,
    },
    NoReply {
        conv: ConversationId,
        user: UserId,
    },
    Tick(Option<ConversationId>),
    Sent {
        conv: ConversationId,
        ok: bool,
    },
    Outcome {
        conv: ConversationId,
        engaged: bool,
    },
    Status(ConversationId),
    Reset(Option<ConversationId>),
    Snapshot,
    Help,
    Quit,
}

pub const HELP: &str = "\
msg <conv> <user> [@|!] <text>   user message (@ = mention, ! = keyword)
reply <conv> <user> [text]       the agent replied to <user>
noreply <conv> <user>            the agent chose not to reply
tick [conv]                      run the proactive scheduler
sent <conv> ok|fail              report a proactive send
outcome <conv> yes|no            report whether the proactive message landed
status <conv>                    show conversation state
reset [conv]                     reset one conversation, or all
snapshot                         write a snapshot now
quit";

fn yes_no(word: Option<&str>, yes: &str, no: &str) -> Result<bool, String> {
    match word {
        Some(w) if w == yes => Ok(true),
        Some(w) if w == no => Ok(false),
        _ => Err(format!("expected `{yes}` or `{no}`")),
    }
}

impl Command {
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Ok(None);
        };
        let mut conv = || {
            words
                .next()
                .map(ConversationId::from)
                .ok_or_else(|| format!("`{head}` needs a conversation"))
        };

        let cmd = match head {
            "msg" | "reply" | "noreply" => {
                let conv = conv()?;
                let rest: Vec<&str> = line.split_whitespace().skip(2).collect();
                let Some((user, rest)) = rest.split_first() else {
                    return Err(format!("`{head}` needs a user"));
                };
                let user = UserId::from(*user);
                match head {
                    "msg" => {
                        let (bypass, rest) = match rest.first() {
                            Some(&"@") => (Bypass::Direct, &rest[1..]),
                            Some(&"!") => (Bypass::Judged, &rest[1..]),
                            _ => (Bypass::None, rest),
                        };
                        Command::Message {
                            conv,
                            user,
                            bypass,
                            text: rest.join(" "),
                        }
                    }
                    "reply" => Command::Reply {
                        conv,
                        user,
                        text: (!rest.is_empty()).then(|| rest.join(" ")),
                    },
                    _ => Command::NoReply { conv, user },
                }
            }
            "tick" => Command::Tick(words.next().map(ConversationId::from)),
            "sent" => {
                let conv = conv()?;
                Command::Sent {
                    conv,
                    ok: yes_no(words.next(), "ok", "fail")?,
                }
            }
            "outcome" => {
                let conv = conv()?;
                Command::Outcome {
                    conv,
                    engaged: yes_no(words.next(), "yes", "no")?,
                }
            }
            "status" => Command::Status(conv()?),
            "reset" => Command::Reset(words.next().filter(|w| *w != "all").map(ConversationId::from)),
            "snapshot" => Command::Snapshot,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(format!("unknown command `{other}`, try `help`")),
        };
        Ok(Some(cmd))
    }
}
