use anyhow::Result;

use crate::client::ChatClient;

pub async fn run(client: &ChatClient, page: usize, limit: usize) -> Result<()> {
    let resp = client.sessions(page, limit).await?;
    println!(
        "Page {} of {} ({} sessions)",
        resp.page,
        resp.total_pages.max(1),
        resp.total_sessions
    );
    for session in resp.sessions {
        println!(
            "{}  {}  {}",
            session.id,
            session.updated_at.format("%Y-%m-%d %H:%M"),
            session.title.as_deref().unwrap_or("(untitled)")
        );
    }
    Ok(())
}
