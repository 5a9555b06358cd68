// Tide fixture: binder-style handlers behind a route-group function and response helpers
use serde::{Deserialize, Serialize};
use tide::{Body, Request, Route};

#[derive(Clone, Default)]
pub struct AppState {
    pub db: String,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub message: String,
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct Note {
    pub id: u64,
    pub title: String,
    pub done: bool,
}

#[derive(Debug, Deserialize)]
pub struct NewNote {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct NoteFilter {
    pub done: Option<bool>,
    pub limit: Option<u32>,
}

fn success<T: Serialize>(data: T) -> tide::Result {
    let body = ApiResponse {
        code: 0,
        message: "ok".to_string(),
        data,
    };
    Ok(Body::from_json(&body)?.into())
}

fn fail(message: &str) -> tide::Result {
    let body = ErrorBody {
        error: message.to_string(),
    };
    Ok(Body::from_json(&body)?.into())
}

async fn list_notes(req: Request<AppState>) -> tide::Result {
    let filter: NoteFilter = req.query()?;
    let notes: Vec<Note> = Vec::new();
    success(notes)
}

async fn get_note(req: Request<AppState>) -> tide::Result {
    let id: u64 = req.param("id")?.parse()?;
    if id == 0 {
        return fail("note not found");
    }
    let note = Note {
        id,
        title: "first".to_string(),
        done: false,
    };
    success(note)
}

async fn create_note(mut req: Request<AppState>) -> tide::Result {
    let input: NewNote = req.body_json().await?;
    let note = Note {
        id: 1,
        title: input.title,
        done: false,
    };
    Ok(Body::from_json(&note)?.into())
}

fn mount_notes(route: &mut Route<'_, AppState>) {
    route.at("/notes").get(list_notes).post(create_note);
    route.at("/notes/:id").get(get_note);
}

#[async_std::main]
async fn main() -> tide::Result<()> {
    let mut app = tide::with_state(AppState::default());
    app.at("/health").get(|_| async { Ok("ok") });

    let mut api = app.at("/api");
    mount_notes(&mut api);

    app.listen("127.0.0.1:8080").await?;
    Ok(())
}
