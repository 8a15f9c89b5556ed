use anyhow::{bail, Context, Result};
use research_client::TradeAction;

/// Auxiliary panels that can be printed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    Historical,
    News,
    Social,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Login {
        username: String,
        token: String,
        user_id: Option<String>,
    },
    Logout,
    Whoami,
    Companies,
    Select(String),
    Ask(String),
    Status,
    Show(Panel),
    Transcript,
    History,
    Rerun(usize),
    New,
    Price(Option<String>),
    Overview(Option<String>),
    Trade {
        action: TradeAction,
        quantity: u32,
        symbol: Option<String>,
    },
    Portfolio {
        refresh: bool,
    },
    Bookmark,
    Remove(String),
    Quit,
    Empty,
}

pub const HELP: &str = "\
Commands:
  login <username> <token> [user-id]   store a session
  logout                               end the session
  whoami                               show the logged-in user
  companies                            list selectable companies
  select <symbol>                      choose the company to research
  ask <question>                       ask about the selected company (bare text works too)
  status                               loading state of each source
  show historical|news|social          print an auxiliary panel
  transcript                           print the conversation
  history                              past questions, newest first
  rerun <n>                            ask history entry n again
  new                                  start a new conversation
  price [symbol]                       current price
  overview [symbol]                    key market statistics
  buy <qty> [symbol] / sell <qty> [symbol]
  portfolio [refresh]                  bookmarked analyses and totals
  bookmark                             add the selected company to the portfolio
  remove <symbol>                      remove a portfolio item
  quit                                 exit (Ctrl-C cancels a running analysis)";

impl Command {
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let args: Vec<&str> = rest.split_whitespace().collect();

        let command = match word.to_ascii_lowercase().as_str() {
            "" => Command::Empty,
            "help" | "?" => Command::Help,
            "login" => match args.as_slice() {
                [username, token] => Command::Login {
                    username: username.to_string(),
                    token: token.to_string(),
                    user_id: None,
                },
                [username, token, user_id] => Command::Login {
                    username: username.to_string(),
                    token: token.to_string(),
                    user_id: Some(user_id.to_string()),
                },
                _ => bail!("usage: login <username> <token> [user-id]"),
            },
            "logout" => Command::Logout,
            "whoami" | "profile" => Command::Whoami,
            "companies" => Command::Companies,
            "select" => match args.as_slice() {
                [symbol] => Command::Select(symbol.to_string()),
                _ => bail!("usage: select <symbol>"),
            },
            "ask" => {
                if rest.is_empty() {
                    bail!("usage: ask <question>");
                }
                Command::Ask(rest.to_string())
            }
            "status" => Command::Status,
            "show" => match args.as_slice() {
                ["historical"] | ["prices"] => Command::Show(Panel::Historical),
                ["news"] => Command::Show(Panel::News),
                ["social"] => Command::Show(Panel::Social),
                _ => bail!("usage: show historical|news|social"),
            },
            "transcript" | "chat" => Command::Transcript,
            "history" => Command::History,
            "rerun" => match args.as_slice() {
                [n] => Command::Rerun(n.parse().with_context(|| format!("'{}' is not a history number", n))?),
                _ => bail!("usage: rerun <n>"),
            },
            "new" | "reset" => Command::New,
            "price" => Command::Price(optional_symbol(&args, "price [symbol]")?),
            "overview" => Command::Overview(optional_symbol(&args, "overview [symbol]")?),
            "buy" | "sell" => {
                let action = if word.eq_ignore_ascii_case("buy") {
                    TradeAction::Buy
                } else {
                    TradeAction::Sell
                };
                let usage = format!("usage: {} <qty> [symbol]", word.to_ascii_lowercase());
                let (quantity, symbol) = match args.as_slice() {
                    [qty] => (*qty, None),
                    [qty, symbol] => (*qty, Some(symbol.to_string())),
                    _ => bail!(usage),
                };
                let quantity: u32 = quantity
                    .parse()
                    .with_context(|| format!("'{}' is not a whole number of shares", quantity))?;
                if quantity == 0 {
                    bail!("quantity must be at least 1");
                }
                Command::Trade {
                    action,
                    quantity,
                    symbol,
                }
            }
            "portfolio" => match args.as_slice() {
                [] => Command::Portfolio { refresh: false },
                ["refresh"] => Command::Portfolio { refresh: true },
                _ => bail!("usage: portfolio [refresh]"),
            },
            "bookmark" => Command::Bookmark,
            "remove" => match args.as_slice() {
                [symbol] => Command::Remove(symbol.to_string()),
                _ => bail!("usage: remove <symbol>"),
            },
            "quit" | "exit" => Command::Quit,
            // Anything else is a question about the selected company.
            _ => Command::Ask(line.to_string()),
        };

        Ok(command)
    }

    /// Commands that talk to the remote services.
    pub fn needs_session(&self) -> bool {
        matches!(
            self,
            Command::Companies
                | Command::Select(_)
                | Command::Ask(_)
                | Command::Rerun(_)
                | Command::Price(_)
                | Command::Overview(_)
                | Command::Trade { .. }
                | Command::Bookmark
                | Command::Portfolio { refresh: true }
        )
    }
}

fn optional_symbol(args: &[&str], usage: &str) -> Result<Option<String>> {
    match args {
        [] => Ok(None),
        [symbol] => Ok(Some(symbol.to_string())),
        _ => bail!("usage: {}", usage),
    }
}
