// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Connects to the live EventSub endpoint and logs every event of one topic.
//!
//! Requires `EVENTSUB_ACCESS_TOKEN`, `EVENTSUB_CLIENT_ID` and `EVENTSUB_USER_ID`.
//! Usage: `eventsub-ws-events [topic] [version] [broadcaster_user_id]`.

use std::{env, error::Error, time::Duration};

use eventsub::{
    common::credential::Credential,
    config::EventSubConfig,
    websocket::{session::EventSubSession, subscription::SubscriptionSpec},
};
use tokio::signal;
use tracing::level_filters::LevelFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let log_level = env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "INFO".to_string())
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::INFO);

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let access_token = env::var("EVENTSUB_ACCESS_TOKEN")?;
    let client_id = env::var("EVENTSUB_CLIENT_ID")?;
    let user_id = env::var("EVENTSUB_USER_ID")?;

    let args: Vec<String> = env::args().collect();
    let topic = args.get(1).map_or("channel.follow", String::as_str);
    let version = args.get(2).map_or("2", String::as_str);
    let broadcaster = args.get(3).map_or(user_id.as_str(), String::as_str);

    let credential = Credential::user(access_token, &client_id, &user_id);
    let session = EventSubSession::from_config(EventSubConfig::default(), credential)?;

    let spec = SubscriptionSpec::new(topic, version)
        .with_filter("broadcaster_user_id", broadcaster)
        .with_filter("moderator_user_id", &user_id);
    let mut subscription = session.create_subscription::<serde_json::Value>(spec);

    tracing::info!("Connecting to {}", session.url());
    session.connect();
    session.wait_until_live(Duration::from_secs(30)).await?;

    loop {
        tokio::select! {
            event = subscription.recv() => match event {
                Some(notification) => tracing::info!(
                    "{} {}: {}",
                    notification.topic,
                    notification.message_id,
                    notification.event
                ),
                None => {
                    tracing::warn!("Subscription '{topic}' revoked");
                    break;
                }
            },
            _ = signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, revoking subscription");
                subscription.revoke_subscription().await;
                break;
            }
        }
    }

    session.disconnect().await;
    Ok(())
}
