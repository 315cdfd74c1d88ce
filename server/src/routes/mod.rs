use rocket::{
    State, catch, get,
    http::{Cookie, CookieJar, Status},
    post,
    response::content::RawHtml,
    serde::json::Json,
};
use tracing::{debug, info, instrument, warn};

use linksweeper_common::{
    models::Pos,
    protocol::{CommandRequest, CommandResponse},
    token,
};

use crate::{app::AppState, commands};

const FLAGGING_MINUTES: i64 = 15;

macro_rules! autoclose_page {
    ($text:literal) => {
        concat!(
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Minesweeper</title>",
            "<script>window.close();</script></head><body><p>",
            $text,
            "</p></body></html>"
        )
    };
}

const CLICKED_PAGE: &str = autoclose_page!(
    "Beep boop you clicked a cell. This window should close automatically, so hopefully you don't see this."
);
const SET_FLAGGING_PAGE: &str = autoclose_page!(
    "Beep boop you're now flagging. This window should close automatically, so hopefully you don't see this."
);
const REMOVE_FLAGGING_PAGE: &str = autoclose_page!(
    "Beep boop you're no longer flagging. This window should close automatically, so hopefully you don't see this."
);
const UNKNOWN_PAGE: &str = concat!(
    "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Minesweeper</title></head>",
    "<body><p>This board doesn't exist anymore, or the link is broken.</p></body></html>"
);

type Page = (Status, RawHtml<&'static str>);

fn page(html: &'static str) -> Page {
    (Status::Ok, RawHtml(html))
}

fn unknown() -> Page {
    (Status::BadRequest, RawHtml(UNKNOWN_PAGE))
}

fn flagging_cookie(board_id: u16) -> String {
    format!("{}_flagging", board_id)
}

#[get("/<cell_token>")]
#[instrument(level = "trace", skip(cookies, app))]
pub async fn click(cell_token: &str, cookies: &CookieJar<'_>, app: &State<AppState>) -> Page {
    let cell = match token::decode(cell_token) {
        Ok(cell) => cell,
        Err(err) => {
            debug!("Rejected cell token {:?}: {}", cell_token, err);
            return unknown();
        }
    };

    let Some(game) = app.games.get(cell.board_id) else {
        debug!("Click for unknown board {}", cell.board_id);
        return unknown();
    };

    let pos = Pos::new(cell.x as usize, cell.y as usize);
    if !game.with_board(|board| board.contains(pos)).await {
        warn!(
            "Click outside board {} at ({}, {})",
            cell.board_id, pos.x, pos.y
        );
        return unknown();
    }

    let flagging = cookies.get(&flagging_cookie(cell.board_id)).is_some();
    let changed = game.click(pos, flagging).await;
    debug!(
        "Click on board {} at ({}, {}), flagging: {}, changed: {}",
        cell.board_id, pos.x, pos.y, flagging, changed
    );
    page(CLICKED_PAGE)
}

#[get("/set-flagging/<board_id>")]
#[instrument(level = "trace", skip(cookies, app))]
pub fn set_flagging(board_id: &str, cookies: &CookieJar<'_>, app: &State<AppState>) -> Page {
    let Some(id) = board_id.parse::<u16>().ok().filter(|id| app.games.get(*id).is_some()) else {
        return unknown();
    };

    cookies.add(
        Cookie::build((flagging_cookie(id), "true"))
            .path("/")
            .max_age(rocket::time::Duration::minutes(FLAGGING_MINUTES)),
    );
    info!("Flag mode on for board {}", id);
    page(SET_FLAGGING_PAGE)
}

#[get("/remove-flagging/<board_id>")]
#[instrument(level = "trace", skip(cookies, app))]
pub fn remove_flagging(board_id: &str, cookies: &CookieJar<'_>, app: &State<AppState>) -> Page {
    let Some(id) = board_id.parse::<u16>().ok().filter(|id| app.games.get(*id).is_some()) else {
        return unknown();
    };

    cookies.remove(Cookie::build((flagging_cookie(id), "")).path("/"));
    info!("Flag mode off for board {}", id);
    page(REMOVE_FLAGGING_PAGE)
}

#[post("/command", format = "json", data = "<request>")]
pub async fn command(request: Json<CommandRequest>, app: &State<AppState>) -> Json<CommandResponse> {
    Json(commands::handle(&request, app.inner()).await)
}

#[catch(404)]
pub fn not_found() -> RawHtml<&'static str> {
    RawHtml(UNKNOWN_PAGE)
}
