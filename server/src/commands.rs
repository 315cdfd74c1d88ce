//! Chat commands: `<prefix> <command> [args]`.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use linksweeper_common::{
    models::GameParams,
    protocol::{CommandRequest, CommandResponse},
};

use crate::{
    app::AppState,
    dispatch,
    game::Game,
    host::HostError,
    logic::Board,
    rate_limit::UpdateLimiter,
    registry::RegistryError,
    render::CharacterSet,
};

/// Share of cells that are mines when a start command names no count.
const DEFAULT_MINE_RATIO: f64 = 0.12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MineSpec {
    Count(i64),
    Percent(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Start {
        mines: Option<MineSpec>,
        width: Option<i64>,
        height: Option<i64>,
    },
    Stop,
    Help,
    Style(CharacterSet),
}

fn parse_mines(word: &str) -> Option<MineSpec> {
    match word.strip_suffix('%') {
        Some(percent) => percent.parse().ok().filter(|p: &f64| p.is_finite()).map(MineSpec::Percent),
        None => word.parse().ok().map(MineSpec::Count),
    }
}

/// Reads a command addressed to one of `prefixes`. Anything else is `None`.
pub fn parse(content: &str, prefixes: &[String]) -> Option<Command> {
    let mut words = content.split_whitespace();
    let prefix = words.next()?.to_lowercase();
    if !prefixes.contains(&prefix) {
        return None;
    }

    let command = match words.next()?.to_lowercase().as_str() {
        "start" | "begin" | "init" | "new" => {
            let args: Vec<&str> = words.take(3).collect();
            Command::Start {
                mines: args.first().and_then(|word| parse_mines(word)),
                width: args.get(1).and_then(|word| word.parse().ok()),
                height: args.get(2).and_then(|word| word.parse().ok()),
            }
        }
        "stop" | "remove" | "delete" => Command::Stop,
        "help" | "what" => Command::Help,
        "mobile" => Command::Style(CharacterSet::MonoWidth),
        "emoji" => Command::Style(CharacterSet::Emoji),
        _ => return None,
    };
    Some(command)
}

pub fn resolve_params(
    mines: Option<MineSpec>,
    width: Option<i64>,
    height: Option<i64>,
    max_width: usize,
    max_height: usize,
) -> GameParams {
    let side = |value: Option<i64>, max: usize| {
        value.map_or(max, |value| value.clamp(1, max as i64) as usize)
    };
    let width = side(width, max_width);
    let height = side(height, max_height);
    let cells = (width * height) as f64;

    let mines = match mines {
        None => (cells * DEFAULT_MINE_RATIO).round() as i64,
        Some(MineSpec::Count(count)) => count,
        Some(MineSpec::Percent(percent)) => (cells * percent / 100.0).round() as i64,
    };

    GameParams {
        width,
        height,
        mines: mines.clamp(0, (width * height) as i64 - 1) as usize,
    }
}

#[derive(Error, Debug)]
pub enum StartError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("failed to post board message: {0}")]
    Host(#[from] HostError),
}

/// Registers a board for `session`, posts it and starts its dispatcher.
#[instrument(level = "trace", skip(app, board))]
pub async fn start_game(
    app: &AppState,
    session: &str,
    starter: &str,
    mut board: Board,
) -> Result<u16, StartError> {
    let events = board.subscribe();
    let config = &app.config;
    let (id, game) = app.games.try_add_with(|id| {
        Game::new(
            id,
            session,
            starter,
            board,
            config.public_url.clone(),
            UpdateLimiter::new(config.update_permits, config.update_window),
        )
    })?;

    if let Err(err) = app.games.bind_session(session, id) {
        app.games.remove(id);
        return Err(err.into());
    }

    match app.host.post(&game.render().await).await {
        Ok(message) => game.set_message_id(message),
        Err(err) => {
            app.games.remove(id);
            return Err(err.into());
        }
    }

    dispatch::spawn(Arc::clone(&game), app.games.clone(), Arc::clone(&app.host), events);
    info!("Started board {} for session {} by {}", id, session, starter);
    Ok(id)
}

fn help_text(prefix: &str, max_width: usize, max_height: usize) -> String {
    let limits = if max_width == max_height {
        max_width.to_string()
    } else {
        format!("{} and {}", max_width, max_height)
    };
    format!(
        "**Available Commands**\n\
         `{prefix} start [mines] [width] [height]` - Starts a new game. Mines can be a count or a percentage, width and height are limited to {limits}.\n\
         `{prefix} start 10% 5 5` - a 5x5 board where 10% of cells are mines.\n\
         `{prefix} start 10 7 5` - a 7x5 board with 10 mines.\n\
         `{prefix} stop` - Removes the game in progress. Only the person who started it or a moderator can do this.\n\
         `{prefix} mobile` / `{prefix} emoji` - Draws the board with mono-width characters or with emoji.\n\
         `{prefix} help` - Shows this list."
    )
}

fn no_board(prefix: &str) -> CommandResponse {
    CommandResponse::reply(format!(
        "This channel doesn't have a board. You can create one with `{} start`.",
        prefix
    ))
}

fn already_active(prefix: &str, id: u16) -> CommandResponse {
    CommandResponse::reply(format!(
        "This channel already has an active board (#{}).\nTo remove the old game use `{} stop`",
        id, prefix
    ))
}

#[instrument(level = "trace", skip(app, request), fields(session = %request.session, author = %request.author))]
pub async fn handle(request: &CommandRequest, app: &AppState) -> CommandResponse {
    let config = &app.config;
    let Some(command) = parse(&request.content, &config.prefixes) else {
        return CommandResponse::silent();
    };
    let prefix = config.prefixes.first().map(String::as_str).unwrap_or("minesweeper");
    debug!("Command from {}: {:?}", request.author, command);

    match command {
        Command::Start {
            mines,
            width,
            height,
        } => {
            if let Some(id) = app.games.session(&request.session) {
                return already_active(prefix, id);
            }
            if !app.creation.check(&request.session) {
                return CommandResponse::reply(
                    "You're starting boards too quickly. Try again in a minute.",
                );
            }

            let params = resolve_params(mines, width, height, config.max_width, config.max_height);
            info!(
                "Creating a {}x{} board with {} mines",
                params.width, params.height, params.mines
            );
            match start_game(app, &request.session, &request.author, Board::new(params)).await {
                Ok(_) => CommandResponse::silent(),
                Err(StartError::Registry(RegistryError::SessionOccupied(id))) => {
                    already_active(prefix, id)
                }
                Err(StartError::Registry(RegistryError::Exhausted { .. })) => {
                    CommandResponse::reply(
                        "Failed to create a board. There might be too many boards in the wild right now.",
                    )
                }
                Err(StartError::Host(err)) => {
                    warn!("Could not post board for {}: {}", request.session, err);
                    CommandResponse::reply("Failed to post the board. Try again later.")
                }
            }
        }
        Command::Stop => {
            let Some((id, game)) = app.games.by_session(&request.session) else {
                return no_board(prefix);
            };
            if game.starter != request.author && !request.can_manage {
                return CommandResponse::reply(
                    "Only the creator of a board or an admin can remove it.",
                );
            }

            app.games.remove(id);
            game.close().await;
            if let Some(message) = game.message_id()
                && let Err(err) = app.host.delete(message).await
            {
                warn!("Failed to delete message of board {}: {}", id, err);
            }
            info!("Board {} stopped by {}", id, request.author);
            CommandResponse::silent()
        }
        Command::Help => CommandResponse::reply(help_text(prefix, config.max_width, config.max_height)),
        Command::Style(style) => {
            let Some((_, game)) = app.games.by_session(&request.session) else {
                return no_board(prefix);
            };
            if game.set_style(style).await {
                let pushed = Arc::clone(&game);
                let host = Arc::clone(&app.host);
                game.limiter()
                    .run_now_or_deferred(move || async move {
                        dispatch::push_latest(&pushed, host.as_ref()).await;
                    })
                    .await;
            }
            CommandResponse::silent()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, host::MemoryHost};

    fn prefixes() -> Vec<String> {
        vec!["minesweeper".to_string(), "ms".to_string()]
    }

    fn app() -> (AppState, Arc<MemoryHost>) {
        let host = Arc::new(MemoryHost::new());
        let config = Config {
            games_per_minute: 2,
            ..Config::default()
        };
        (AppState::new(config, host.clone()), host)
    }

    fn request(author: &str, content: &str) -> CommandRequest {
        CommandRequest {
            session: "channel".to_string(),
            author: author.to_string(),
            content: content.to_string(),
            can_manage: false,
        }
    }

    #[test]
    fn parses_commands_after_a_prefix() {
        let prefixes = prefixes();
        assert_eq!(parse("ms help", &prefixes), Some(Command::Help));
        assert_eq!(parse("Minesweeper  WHAT", &prefixes), Some(Command::Help));
        assert_eq!(parse("ms delete", &prefixes), Some(Command::Stop));
        assert_eq!(
            parse("ms mobile", &prefixes),
            Some(Command::Style(CharacterSet::MonoWidth))
        );
        assert_eq!(
            parse("ms new 10% 5 x", &prefixes),
            Some(Command::Start {
                mines: Some(MineSpec::Percent(10.0)),
                width: Some(5),
                height: None,
            })
        );
        assert_eq!(parse("ms", &prefixes), None);
        assert_eq!(parse("ms dance", &prefixes), None);
        assert_eq!(parse("hello ms start", &prefixes), None);
        assert_eq!(parse("", &prefixes), None);
    }

    #[test]
    fn start_defaults_to_the_largest_board() {
        assert_eq!(
            resolve_params(None, None, None, 9, 9),
            GameParams {
                width: 9,
                height: 9,
                mines: 10
            }
        );
    }

    #[test]
    fn start_arguments_are_clamped() {
        assert_eq!(
            resolve_params(Some(MineSpec::Count(500)), Some(20), Some(0), 9, 9),
            GameParams {
                width: 9,
                height: 1,
                mines: 8
            }
        );
        assert_eq!(
            resolve_params(Some(MineSpec::Count(-3)), Some(4), Some(4), 9, 9).mines,
            0
        );
        assert_eq!(
            resolve_params(Some(MineSpec::Percent(10.0)), Some(5), Some(5), 9, 9).mines,
            3
        );
        assert_eq!(
            resolve_params(Some(MineSpec::Percent(100.0)), Some(2), Some(2), 9, 9).mines,
            3
        );
    }

    #[tokio::test]
    async fn one_board_per_session() {
        let (app, host) = app();

        let reply = handle(&request("alice", "minesweeper start 5 4 4"), &app).await;
        assert_eq!(reply.reply, None);
        assert_eq!(host.message_count(), 1);
        let (id, game) = app.games.by_session("channel").unwrap();
        assert_eq!(game.with_board(|board| board.mine_count()).await, 5);

        let reply = handle(&request("bob", "minesweeper start"), &app).await;
        assert!(reply.reply.unwrap().contains(&format!("#{}", id)));
        assert_eq!(app.games.len(), 1);
    }

    #[tokio::test]
    async fn creation_budget_is_per_session() {
        let (app, _) = app();

        for _ in 0..2 {
            handle(&request("alice", "minesweeper start"), &app).await;
            handle(&request("alice", "minesweeper stop"), &app).await;
        }
        let reply = handle(&request("alice", "minesweeper start"), &app).await;
        assert!(reply.reply.unwrap().contains("too quickly"));
        assert!(app.games.is_empty());
    }

    #[tokio::test]
    async fn only_the_starter_or_a_manager_can_stop() {
        let (app, host) = app();
        handle(&request("alice", "minesweeper start"), &app).await;

        let reply = handle(&request("bob", "minesweeper stop"), &app).await;
        assert!(reply.reply.unwrap().starts_with("Only the creator"));
        assert_eq!(app.games.len(), 1);

        let manager = CommandRequest {
            can_manage: true,
            ..request("bob", "minesweeper stop")
        };
        assert_eq!(handle(&manager, &app).await.reply, None);
        assert!(app.games.is_empty());
        assert_eq!(host.message_count(), 0);

        let reply = handle(&request("alice", "minesweeper stop"), &app).await;
        assert!(reply.reply.unwrap().contains("doesn't have a board"));
    }

    #[tokio::test]
    async fn style_switch_redraws_the_board() {
        let (app, host) = app();
        handle(&request("alice", "minesweeper start"), &app).await;
        let (_, game) = app.games.by_session("channel").unwrap();

        handle(&request("alice", "minesweeper mobile"), &app).await;
        let shown = host.message(game.message_id().unwrap()).unwrap();
        assert!(shown.description.contains('＃'));
        assert_eq!(host.edit_count(), 1);
    }

    #[tokio::test]
    async fn help_and_unknown_content() {
        let (app, _) = app();
        let help = handle(&request("alice", "minesweeper help"), &app).await;
        assert!(help.reply.unwrap().contains("`minesweeper start [mines] [width] [height]`"));

        assert_eq!(handle(&request("alice", "good morning"), &app).await.reply, None);
    }
}
