#[tokio::main]
async fn main() {
    quad::web::run().await;
}
