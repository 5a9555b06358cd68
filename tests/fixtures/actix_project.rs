// Actix-Web fixture: attribute routes mounted through a scope and a configure function
use actix_web::{get, post, web, App, HttpRequest, HttpResponse, HttpServer, Responder};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct User {
    pub id: u32,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<i32>,
    pub limit: Option<i32>,
}

#[get("/users")]
async fn get_users(query: web::Query<ListQuery>) -> impl Responder {
    HttpResponse::Ok().json(Vec::<User>::new())
}

#[get("/users/{id}")]
async fn get_user(path: web::Path<u32>) -> impl Responder {
    let id = path.into_inner();
    HttpResponse::Ok().json(User {
        id,
        name: "Test".to_string(),
        email: "test@example.com".to_string(),
    })
}

#[post("/users")]
async fn create_user(payload: web::Json<CreateUserRequest>) -> impl Responder {
    HttpResponse::Created().json(User {
        id: 1,
        name: payload.name.clone(),
        email: payload.email.clone(),
    })
}

async fn delete_user(req: HttpRequest) -> impl Responder {
    let id = req.match_info().get("id");
    HttpResponse::NoContent().finish()
}

async fn health() -> impl Responder {
    HttpResponse::Ok().body("OK")
}

fn user_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(get_users)
        .service(get_user)
        .service(create_user)
        .route("/users/{id}", web::delete().to(delete_user));
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    HttpServer::new(|| {
        App::new()
            .route("/health", web::get().to(health))
            .service(web::scope("/api/v1").configure(user_routes))
    })
    .bind(("127.0.0.1", 8080))?
    .run()
    .await
}
