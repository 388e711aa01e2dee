use std::sync::Arc;

use session_gate::{ApiClient, Config, FileTokenStore, LoginRedirect};

#[derive(serde::Deserialize, Debug)]
struct Profile {
    username: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Optional: enable basic logging for the example
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    // API_BASE_URL must point at the backend, e.g. http://localhost:8000/api
    let cfg = Config::from_env()?;
    let store = Arc::new(FileTokenStore::open("tokens.json")?);
    let redirect: Arc<dyn LoginRedirect> = Arc::new(|| eprintln!("session expired; please log in again"));
    let client = ApiClient::new(cfg, store, redirect)?;

    if client.session().access_token().is_none() {
        let user = std::env::var("API_USERNAME")?;
        let pass = std::env::var("API_PASSWORD")?;
        client.login(&user, &pass).await?;
    }

    let me: Profile = client.get("/auth/me/").await?;
    println!("logged in as {}", me.username);
    Ok(())
}
