use anyhow::Result;

use crate::client::ChatClient;

pub async fn run(client: &ChatClient, session_id: &str, message_id: &str) -> Result<()> {
    let resp = client.delete_message(session_id, message_id).await?;
    println!(
        "Deleted {:?} message {} from session {}",
        resp.deleted.role, message_id, resp.session_id
    );
    Ok(())
}
