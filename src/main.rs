#[actix_web::main]
async fn main() -> std::io::Result<()> {
    consent_server::run().await
}
