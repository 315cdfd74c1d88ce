use std::{sync::Arc, time::Duration};

use rocket::{http::Status, local::asynchronous::Client};

use linksweeper_common::{
    models::Pos,
    protocol::{CommandRequest, CommandResponse},
    token,
};
use linksweeper_server::{
    app::{self, AppState},
    commands::start_game,
    config::Config,
    data::CellState,
    host::MemoryHost,
    logic::Board,
};

async fn setup() -> (Client, AppState, Arc<MemoryHost>) {
    let host = Arc::new(MemoryHost::new());
    let config = Config {
        public_url: "https://sweeper.test".to_string(),
        ..Config::default()
    };
    let state = AppState::new(config, host.clone());
    let client = Client::tracked(app::build(state.clone())).await.unwrap();
    (client, state, host)
}

async fn cell_state(state: &AppState, id: u16, pos: Pos) -> Option<CellState> {
    let game = state.games.get(id)?;
    game.with_board(|board| board.cell(pos).map(|cell| cell.state)).await
}

fn command(author: &str, content: &str, can_manage: bool) -> CommandRequest {
    CommandRequest {
        session: "channel".to_string(),
        author: author.to_string(),
        content: content.to_string(),
        can_manage,
    }
}

#[rocket::async_test]
async fn winning_click_pushes_the_result_and_retires_the_board() {
    let (client, state, host) = setup().await;
    let id = start_game(&state, "channel", "alice", Board::from_layout(3, 3, &[Pos::new(0, 0)]))
        .await
        .unwrap();
    let message = state.games.get(id).unwrap().message_id().unwrap().to_string();
    assert!(host.message(&message).unwrap().description.contains("https://sweeper.test/"));

    let path = format!("/{}", token::encode(id, 2, 2));
    let response = client.get(path.as_str()).dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    assert!(response.into_string().await.unwrap().contains("clicked a cell"));

    for _ in 0..100 {
        if state.games.get(id).is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(state.games.get(id).is_none());
    assert_eq!(state.games.session("channel"), None);
    assert!(host.message(&message).unwrap().title.contains("You win"));

    let response = client.get(path.as_str()).dispatch().await;
    assert_eq!(response.status(), Status::BadRequest);
}

#[rocket::async_test]
async fn flag_mode_cookie_turns_clicks_into_flags() {
    let (client, state, _) = setup().await;
    let layout = [Pos::new(0, 0), Pos::new(2, 2)];
    let id = start_game(&state, "channel", "alice", Board::from_layout(3, 3, &layout))
        .await
        .unwrap();
    let cookie_name = format!("{}_flagging", id);

    let response = client.get(format!("/set-flagging/{}", id)).dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    let cookie = response.cookies().get(&cookie_name).cloned().unwrap();
    assert_eq!(cookie.path(), Some("/"));

    client
        .get(format!("/{}", token::encode(id, 1, 1)))
        .dispatch()
        .await;
    assert_eq!(cell_state(&state, id, Pos::new(1, 1)).await, Some(CellState::Flagged));

    let response = client.get(format!("/remove-flagging/{}", id)).dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    assert_eq!(
        response.cookies().get(&cookie_name).map(|cookie| cookie.value().to_string()),
        Some(String::new())
    );

    let untracked = Client::untracked(app::build(state.clone())).await.unwrap();
    untracked
        .get(format!("/{}", token::encode(id, 0, 1)))
        .dispatch()
        .await;
    assert_eq!(cell_state(&state, id, Pos::new(0, 1)).await, Some(CellState::Cleared));
}

#[rocket::async_test]
async fn broken_links_get_the_unknown_page() {
    let (client, state, _) = setup().await;
    let id = start_game(&state, "channel", "alice", Board::from_layout(3, 3, &[Pos::new(0, 0)]))
        .await
        .unwrap();
    let missing = id.wrapping_add(1);

    for path in [
        "/abc".to_string(),
        "/@@@@".to_string(),
        format!("/{}", token::encode(missing, 0, 0)),
        format!("/{}", token::encode(id, 5, 5)),
        "/set-flagging/not-a-board".to_string(),
        format!("/set-flagging/{}", missing),
        format!("/remove-flagging/{}", missing),
    ] {
        let response = client.get(path.as_str()).dispatch().await;
        assert_eq!(response.status(), Status::BadRequest, "{}", path);
        assert!(response.into_string().await.unwrap().contains("doesn't exist"));
    }

    let response = client.get("/a/b/c").dispatch().await;
    assert_eq!(response.status(), Status::NotFound);
    assert!(response.into_string().await.unwrap().contains("doesn't exist"));

    assert_eq!(cell_state(&state, id, Pos::new(2, 2)).await, Some(CellState::Normal));
}

#[rocket::async_test]
async fn command_endpoint_manages_boards() {
    let (client, state, host) = setup().await;

    let post = |request: CommandRequest| {
        let client = &client;
        async move {
            client
                .post("/command")
                .json(&request)
                .dispatch()
                .await
                .into_json::<CommandResponse>()
                .await
                .unwrap()
        }
    };

    let started = post(command("alice", "minesweeper start 10% 5 5", false)).await;
    assert_eq!(started.reply, None);
    assert_eq!(host.message_count(), 1);
    let (_, game) = state.games.by_session("channel").unwrap();
    assert_eq!(game.with_board(|board| (board.width(), board.mine_count())).await, (5, 3));

    let again = post(command("bob", "minesweeper start", false)).await;
    assert!(again.reply.unwrap().contains("already has an active board"));

    let refused = post(command("bob", "minesweeper stop", false)).await;
    assert!(refused.reply.unwrap().starts_with("Only the creator"));

    let stopped = post(command("alice", "minesweeper stop", false)).await;
    assert_eq!(stopped.reply, None);
    assert!(state.games.is_empty());
    assert_eq!(host.message_count(), 0);

    let help = post(command("carol", "minesweeper help", false)).await;
    assert!(help.reply.unwrap().contains("Available Commands"));

    let ignored = post(command("carol", "just chatting", false)).await;
    assert_eq!(ignored.reply, None);
}
