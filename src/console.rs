//! Operator commands read from stdin.

use anyhow::{Context, anyhow, bail};
use showrunner::state::{
    board::LotteryOption,
    content::{CategoryFilter, CategoryId, GameMode, TilePos},
    team::Team,
};

/// Help text printed on `help` and after an unknown command.
pub const USAGE: &str = "\
commands:
  mode image|word|board     switch the active mode
  start                     start the next round
  reveal                    image mode: leave the hint and start the reveal
  buzz <team>               a team buzzes in
  ok [points]               correct answer (image mode takes optional points)
  wrong                     wrong answer
  lottery <label> [points]  board mode: apply the drawn lottery option
  remove <team>             board mode: remove a team after a removal option
  skip                      board mode: skip the pending removals
  tile <row> <col>          board mode: reveal a tile
  confirm                   board mode: confirm the revealed tile
  scoreboard                show the scoreboard
  filter all|<ids...>       restrict the active mode to categories
  reset                     reset the active mode
  scores                    fetch and print the scores
  reset-scores              reset every team score (asks for confirmation)
  view                      print the current round
  quit";

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Mode(GameMode),
    Start,
    Reveal,
    Buzz(Team),
    Correct(Option<i32>),
    Wrong,
    Lottery(LotteryOption),
    Remove(Team),
    Skip,
    Tile(TilePos),
    Confirm,
    Scoreboard,
    Filter(CategoryFilter),
    Reset,
    Scores,
    ResetScores,
    View,
    Help,
    Quit,
}

impl Command {
    /// Parse one line; blank lines yield `None`.
    pub fn parse(line: &str) -> anyhow::Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match name.to_lowercase().as_str() {
            "mode" => Command::Mode(parse_mode(single(&args, "mode")?)?),
            "start" => Command::Start,
            "reveal" => Command::Reveal,
            "buzz" => Command::Buzz(single(&args, "buzz")?.parse()?),
            "ok" => Command::Correct(
                args.first()
                    .map(|points| points.parse().context("points must be a number"))
                    .transpose()?,
            ),
            "wrong" => Command::Wrong,
            "lottery" => Command::Lottery(parse_lottery(&args)?),
            "remove" => Command::Remove(single(&args, "remove")?.parse()?),
            "skip" => Command::Skip,
            "tile" => match args.as_slice() {
                [row, col] => Command::Tile(TilePos::new(
                    row.parse().context("row must be a number")?,
                    col.parse().context("column must be a number")?,
                )),
                _ => bail!("usage: tile <row> <col>"),
            },
            "confirm" => Command::Confirm,
            "scoreboard" => Command::Scoreboard,
            "filter" => Command::Filter(parse_filter(&args)?),
            "reset" => Command::Reset,
            "scores" => Command::Scores,
            "reset-scores" => Command::ResetScores,
            "view" => Command::View,
            "help" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => bail!("unknown command `{other}`"),
        };
        Ok(Some(command))
    }
}

fn single<'a>(args: &[&'a str], command: &str) -> anyhow::Result<&'a str> {
    match args {
        [value] => Ok(value),
        _ => Err(anyhow!("`{command}` takes exactly one argument")),
    }
}

fn parse_mode(value: &str) -> anyhow::Result<GameMode> {
    match value.to_lowercase().as_str() {
        "image" => Ok(GameMode::ImageReveal),
        "word" => Ok(GameMode::WordReveal),
        "board" => Ok(GameMode::Board),
        other => bail!("unknown mode `{other}`"),
    }
}

/// Labels may span several words (`Tire duas`, `10 a 50 30`), so the trailing
/// number is only taken as points when the whole text is not a label.
fn parse_lottery(args: &[&str]) -> anyhow::Result<LotteryOption> {
    if args.is_empty() {
        bail!("usage: lottery <label> [points]");
    }
    let whole = args.join(" ");
    let first_error = match LotteryOption::from_label(&whole, None) {
        Ok(option) => return Ok(option),
        Err(err) => err,
    };

    if let Some((last, label)) = args.split_last() {
        if let Ok(points) = last.parse::<i32>() {
            if let Ok(option) = LotteryOption::from_label(&label.join(" "), Some(points)) {
                return Ok(option);
            }
        }
    }
    Err(first_error.into())
}

fn parse_filter(args: &[&str]) -> anyhow::Result<CategoryFilter> {
    if matches!(args, [] | ["all"]) {
        return Ok(CategoryFilter::all());
    }
    let ids = args
        .iter()
        .flat_map(|arg| arg.split(','))
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse::<CategoryId>()
                .with_context(|| format!("invalid category id `{id}`"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(CategoryFilter::new(ids))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_line_is_not_a_command() {
        assert_eq!(Command::parse("   ").unwrap(), None);
    }

    #[test]
    fn team_commands_accept_portuguese_names() {
        assert_eq!(
            Command::parse("buzz azul").unwrap(),
            Some(Command::Buzz(Team::Blue))
        );
        assert!(Command::parse("buzz purple").is_err());
    }

    #[test]
    fn multi_word_lottery_labels() {
        assert_eq!(
            Command::parse("lottery Tire duas").unwrap(),
            Some(Command::Lottery(LotteryOption::RemoveTwo))
        );
        assert_eq!(
            Command::parse("lottery 10 a 50 30").unwrap(),
            Some(Command::Lottery(LotteryOption::PickValue(30)))
        );
        assert!(Command::parse("lottery 10 a 50").is_err());
    }

    #[test]
    fn verdict_points_are_optional() {
        assert_eq!(Command::parse("ok").unwrap(), Some(Command::Correct(None)));
        assert_eq!(
            Command::parse("ok 15").unwrap(),
            Some(Command::Correct(Some(15)))
        );
    }

    #[test]
    fn filter_takes_commas_or_spaces() {
        assert_eq!(
            Command::parse("filter 3,1 2").unwrap(),
            Some(Command::Filter(CategoryFilter::new([1, 2, 3])))
        );
        assert_eq!(
            Command::parse("filter all").unwrap(),
            Some(Command::Filter(CategoryFilter::all()))
        );
    }

    #[test]
    fn tile_needs_row_and_column() {
        assert_eq!(
            Command::parse("tile 1 2").unwrap(),
            Some(Command::Tile(TilePos::new(1, 2)))
        );
        assert!(Command::parse("tile 1").is_err());
    }
}
