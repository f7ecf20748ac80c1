use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::{router, ApiState};
use crate::clock::Clock;
use crate::config::Config;
use crate::db::memory_pool;
use crate::notify::Notifier;

const ADMIN_KEY: &str = "test-admin-key";
const ADMIN_TRON: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";
const USER_TRON: &str = "TXYZabcdefghijkLMNopqrstuvwxyz1234";

const STARTER: i64 = 1;
const ADVANCED: i64 = 2;

struct TestApp {
    app: Router,
    clock: Clock,
}

impl TestApp {
    async fn new() -> Self {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("ADMIN_API_KEY", ADMIN_KEY),
            ("ADMIN_WALLET_TRC20", ADMIN_TRON),
            ("ALLOW_SIMULATION", "true"),
            ("SESSION_TTL_HOURS", "2160"),
        ]);
        let config = Config::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        let clock = Clock::manual(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        let state = Arc::new(ApiState {
            pool: memory_pool().await,
            config,
            clock: clock.clone(),
            notifier: Notifier::disabled(),
        });
        TestApp {
            app: router(state),
            clock,
        }
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        auth: Auth<'_>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        match auth {
            Auth::None => {}
            Auth::User(token) => req = req.header("authorization", format!("Bearer {token}")),
            Auth::Admin(key) => req = req.header("x-admin-key", key),
        }
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let resp = self.app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Create a user through the admin endpoint; returns (token, referral code).
    async fn user(&self, email: &str, referred_by: Option<&str>) -> (String, String) {
        let (status, body) = self
            .send(
                "POST",
                "/admin/users",
                Auth::Admin(ADMIN_KEY),
                Some(json!({ "email": email, "referral_code": referred_by })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (
            body["data"]["token"].as_str().unwrap().to_string(),
            body["data"]["user"]["referral_code"].as_str().unwrap().to_string(),
        )
    }

    /// Create and confirm an investment; returns its id.
    async fn invest(&self, token: &str, plan_id: i64, amount: f64, months: i64, n: u64) -> i64 {
        let (status, body) = self
            .send(
                "POST",
                "/investments",
                Auth::User(token),
                Some(json!({
                    "plan_id": plan_id,
                    "amount": amount,
                    "duration_months": months,
                    "wallet_address": USER_TRON,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let id = body["data"]["investment"]["id"].as_i64().unwrap();

        let (status, body) = self
            .send(
                "POST",
                &format!("/investments/{id}/confirm"),
                Auth::User(token),
                Some(json!({ "tx_hash": tx_hash(n) })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["status"], "ACTIVE");
        id
    }

    async fn investment(&self, token: &str, id: i64) -> Value {
        let (status, body) = self
            .send("GET", &format!("/investments/{id}"), Auth::User(token), None)
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["data"].clone()
    }
}

#[derive(Clone, Copy)]
enum Auth<'a> {
    None,
    User(&'a str),
    Admin(&'a str),
}

fn tx_hash(n: u64) -> String {
    format!("{n:064x}")
}

fn close(v: &Value, expected: f64) -> bool {
    v.as_f64().is_some_and(|x| (x - expected).abs() < 0.011)
}

#[tokio::test]
async fn health_is_public() {
    let app = TestApp::new().await;
    let (status, body) = app.send("GET", "/health", Auth::None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn plans_list_the_catalogue() {
    let app = TestApp::new().await;
    let (status, body) = app.send("GET", "/plans", Auth::None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["plans"].as_array().unwrap().len(), 4);
    assert_eq!(body["data"]["next_activation_at"], "2025-01-15T00:00:00Z");
    assert_eq!(body["data"]["days_until_activation"], 14);
}

#[tokio::test]
async fn requests_need_credentials() {
    let app = TestApp::new().await;
    let (status, body) = app.send("GET", "/investments", Auth::None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = app
        .send("GET", "/investments", Auth::User("bogus"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.send("GET", "/admin/stats", Auth::None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    for key in ["wrong", "test-admin-kez", "test-admin-key2"] {
        let (status, _) = app.send("GET", "/admin/stats", Auth::Admin(key), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{key}");
    }
}

#[tokio::test]
async fn expired_sessions_can_be_reissued() {
    let app = TestApp::new().await;
    let (status, body) = app
        .send(
            "POST",
            "/admin/users",
            Auth::Admin(ADMIN_KEY),
            Some(json!({ "email": "olga@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let user_id = body["data"]["user"]["id"].as_i64().unwrap();
    let old_token = body["data"]["token"].as_str().unwrap().to_string();

    app.clock.advance(Duration::days(91));
    let (status, _) = app
        .send("GET", "/investments", Auth::User(&old_token), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let uri = format!("/admin/users/{user_id}/sessions");
    let (status, _) = app.send("POST", &uri, Auth::None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.send("POST", &uri, Auth::Admin(ADMIN_KEY), None).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["user"]["id"], user_id);
    let token = body["data"]["token"].as_str().unwrap().to_string();
    assert_ne!(token, old_token);
    let (status, _) = app.send("GET", "/investments", Auth::User(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send("POST", "/admin/users/9999/sessions", Auth::Admin(ADMIN_KEY), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_quotes_and_returns_payment_instructions() {
    let app = TestApp::new().await;
    let (token, _) = app.user("alice@example.com", None).await;

    let (status, body) = app
        .send(
            "POST",
            "/investments",
            Auth::User(&token),
            Some(json!({
                "plan_id": ADVANCED,
                "amount": 1500.0,
                "duration_months": 6,
                "wallet_address": USER_TRON,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let data = &body["data"];
    assert_eq!(data["investment"]["status"], "PENDING");
    assert_eq!(data["investment"]["package"], "Advanced");
    assert_eq!(data["quote"]["effective_rate"], 18.5);
    assert_eq!(data["quote"]["cash_bonus"], 500.0);
    assert_eq!(data["payment"]["network"], "TRON");
    assert_eq!(data["payment"]["to_address"], ADMIN_TRON);
    assert_eq!(data["payment"]["amount_smallest_unit"], "1500000000");

    let (status, body) = app
        .send(
            "POST",
            "/investments",
            Auth::User(&token),
            Some(json!({
                "plan_id": ADVANCED,
                "amount": 1500.0,
                "duration_months": 4,
                "wallet_address": USER_TRON,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("3, 6, or 12"));

    let (status, _) = app
        .send(
            "POST",
            "/investments",
            Auth::User(&token),
            Some(json!({
                "plan_id": ADVANCED,
                "amount": 1500.0,
                "duration_months": 6,
                "wallet_address": "not-a-wallet",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn confirmed_investment_accrues_and_tx_hashes_are_unique() {
    let app = TestApp::new().await;
    let (token, _) = app.user("bob@example.com", None).await;
    let id = app.invest(&token, ADVANCED, 1500.0, 6, 1).await;

    app.clock.advance(Duration::days(10));
    let inv = app.investment(&token, id).await;
    assert_eq!(inv["days_passed"], 10);
    // 1500 at 18.5 %/month for 10 days.
    assert!(close(&inv["current_return"], 92.5), "{inv}");

    let (status, body) = app
        .send(
            "POST",
            "/investments",
            Auth::User(&token),
            Some(json!({
                "plan_id": ADVANCED,
                "amount": 1200.0,
                "duration_months": 3,
                "wallet_address": USER_TRON,
            })),
        )
        .await;
    let second = body["data"]["investment"]["id"].as_i64().unwrap();
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app
        .send(
            "POST",
            &format!("/investments/{second}/confirm"),
            Auth::User(&token),
            Some(json!({ "tx_hash": tx_hash(1) })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .send("DELETE", &format!("/investments/{second}"), Auth::User(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "CANCELLED");
}

#[tokio::test]
async fn other_users_cannot_see_an_investment() {
    let app = TestApp::new().await;
    let (owner, _) = app.user("owner@example.com", None).await;
    let (other, _) = app.user("other@example.com", None).await;
    let id = app.invest(&owner, STARTER, 500.0, 3, 2).await;

    let (status, _) = app
        .send("GET", &format!("/investments/{id}"), Auth::User(&other), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rejected_profit_withdrawal_is_released() {
    let app = TestApp::new().await;
    let (token, _) = app.user("carol@example.com", None).await;
    let id = app.invest(&token, ADVANCED, 1500.0, 6, 3).await;
    app.clock.advance(Duration::days(10));

    let (status, body) = app
        .send(
            "POST",
            &format!("/investments/{id}/partial-withdraw"),
            Auth::User(&token),
            Some(json!({ "amount": 50.0, "trc20_address": USER_TRON, "kind": "profit" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let withdrawal_id = body["data"]["withdrawal"]["id"].as_i64().unwrap();
    assert!(close(&body["data"]["investment"]["available_profit"], 42.5));

    let (status, body) = app
        .send(
            "POST",
            &format!("/investments/{id}/partial-withdraw"),
            Auth::User(&token),
            Some(json!({ "amount": 500.0, "trc20_address": USER_TRON })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Insufficient profit"));

    let (status, _) = app
        .send(
            "POST",
            &format!("/admin/withdrawals/{withdrawal_id}/reject"),
            Auth::Admin(ADMIN_KEY),
            Some(json!({ "note": "wrong address" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let inv = app.investment(&token, id).await;
    assert!(close(&inv["available_profit"], 92.5), "{inv}");

    let (_, body) = app.send("GET", "/withdrawals", Auth::User(&token), None).await;
    assert_eq!(body["data"][0]["status"], "REJECTED");
    assert_eq!(body["data"][0]["note"], "wrong address");
}

#[tokio::test]
async fn early_withdrawal_within_window() {
    let app = TestApp::new().await;
    let (token, _) = app.user("dave@example.com", None).await;
    let id = app.invest(&token, STARTER, 500.0, 6, 4).await;
    app.clock.advance(Duration::days(5));

    let uri = format!("/investments/{id}/early-withdraw");
    let (status, body) = app.send("POST", &uri, Auth::User(&token), None).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let withdrawal = &body["data"]["withdrawal"];
    assert_eq!(withdrawal["kind"], "EARLY");
    assert_eq!(withdrawal["amount"], 500.0);
    assert_eq!(withdrawal["days_invested"], 5);
    // 500 at 15.5 %/month for 5 days, forfeited.
    assert!(close(&withdrawal["forfeited_interest"], 12.92));

    let (status, _) = app.send("POST", &uri, Auth::User(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let withdrawal_id = withdrawal["id"].as_i64().unwrap();
    let (status, _) = app
        .send(
            "POST",
            &format!("/admin/withdrawals/{withdrawal_id}/approve"),
            Auth::Admin(ADMIN_KEY),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.investment(&token, id).await["status"], "WITHDRAWN");
}

#[tokio::test]
async fn exit_waits_for_pending_profit_payout() {
    let app = TestApp::new().await;
    let (token, _) = app.user("nina@example.com", None).await;
    let id = app.invest(&token, ADVANCED, 1500.0, 6, 18).await;
    app.clock.advance(Duration::days(10));

    let (status, body) = app
        .send(
            "POST",
            &format!("/investments/{id}/partial-withdraw"),
            Auth::User(&token),
            Some(json!({ "amount": 50.0, "trc20_address": USER_TRON, "kind": "profit" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let withdrawal_id = body["data"]["withdrawal"]["id"].as_i64().unwrap();

    let uri = format!("/investments/{id}/early-withdraw");
    let (status, body) = app.send("POST", &uri, Auth::User(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("still pending"));

    let (status, _) = app
        .send(
            "POST",
            &format!("/admin/withdrawals/{withdrawal_id}/reject"),
            Auth::Admin(ADMIN_KEY),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.send("POST", &uri, Auth::User(&token), None).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["withdrawal"]["amount"], 1500.0);
}

#[tokio::test]
async fn early_withdrawal_closes_after_thirty_days() {
    let app = TestApp::new().await;
    let (token, _) = app.user("erin@example.com", None).await;
    let id = app.invest(&token, STARTER, 500.0, 6, 5).await;
    app.clock.advance(Duration::days(31));

    let (status, body) = app
        .send(
            "POST",
            &format!("/investments/{id}/early-withdraw"),
            Auth::User(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("30 days"));
}

#[tokio::test]
async fn full_withdrawal_after_maturity() {
    let app = TestApp::new().await;
    let (token, _) = app.user("frank@example.com", None).await;
    let id = app.invest(&token, STARTER, 600.0, 3, 6).await;
    let uri = format!("/investments/{id}/withdraw");

    let (status, _) = app
        .send("POST", &uri, Auth::User(&token), Some(json!({ "trc20_address": USER_TRON })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send(
            "POST",
            &format!("/admin/investments/{id}/shift-days"),
            Auth::Admin(ADMIN_KEY),
            Some(json!({ "days": 100 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "COMPLETED");

    let (status, body) = app
        .send("POST", &uri, Auth::User(&token), Some(json!({ "trc20_address": USER_TRON })))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    // 600 principal + 90 days at 14 %/month.
    assert!(close(&body["data"]["withdrawal"]["amount"], 852.0), "{body}");

    let (status, _) = app
        .send("POST", &uri, Auth::User(&token), Some(json!({ "trc20_address": USER_TRON })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .send(
            "POST",
            &format!("/admin/investments/{id}/shift-days"),
            Auth::Admin(ADMIN_KEY),
            Some(json!({ "days": 10 })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND, "completed rows keep their dates");
}

#[tokio::test]
async fn upgrade_is_paid_then_deferred_to_activation_date() {
    let app = TestApp::new().await;
    let (token, _) = app.user("grace@example.com", None).await;
    let id = app.invest(&token, ADVANCED, 1000.0, 12, 7).await;

    let upgrade = json!({ "additional_amount": 2500.0, "new_package": "pro" });
    let (status, _) = app
        .send(
            "POST",
            &format!("/investments/{id}/upgrade"),
            Auth::User(&token),
            Some(upgrade.clone()),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "same-day upgrade");

    app.clock.advance(Duration::days(2));
    let (status, body) = app
        .send(
            "POST",
            &format!("/investments/{id}/upgrade"),
            Auth::User(&token),
            Some(upgrade),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let upgrade_id = body["data"]["upgrade"]["id"].as_i64().unwrap();
    assert_eq!(body["data"]["upgrade"]["kind"], "PACKAGE_CHANGE");
    assert_eq!(body["data"]["payment"]["amount_smallest_unit"], "2500000000");

    let (status, body) = app
        .send(
            "POST",
            &format!("/investments/upgrades/{upgrade_id}/confirm"),
            Auth::User(&token),
            Some(json!({ "tx_hash": tx_hash(70) })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let inv = &body["data"]["investment"];
    assert_eq!(inv["amount"], 3500.0);
    assert_eq!(inv["package"], "Advanced");
    assert_eq!(inv["pending_upgrade"]["rate"], 23.0);
    assert_eq!(inv["pending_upgrade"]["activates_at"], "2025-01-15T00:00:00Z");

    app.clock.advance(Duration::days(20));
    let inv = app.investment(&token, id).await;
    assert_eq!(inv["package"], "Pro");
    assert_eq!(inv["effective_rate"], 23.0);
    assert_eq!(inv["current_rate"], 23.0);
    assert!(inv["pending_upgrade"].is_null());

    let (_, body) = app
        .send("GET", "/investments/upgrades", Auth::User(&token), None)
        .await;
    assert_eq!(body["data"][0]["status"], "COMPLETED");
}

#[tokio::test]
async fn reinvest_moves_profit_into_principal() {
    let app = TestApp::new().await;
    let (token, _) = app.user("heidi@example.com", None).await;
    let id = app.invest(&token, STARTER, 990.0, 3, 8).await;
    app.clock.advance(Duration::days(10));

    let (status, body) = app
        .send(
            "POST",
            &format!("/investments/{id}/reinvest"),
            Auth::User(&token),
            Some(json!({ "amount": 20.0 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["reinvest"]["upgraded"], true);
    assert_eq!(body["data"]["investment"]["amount"], 1010.0);
    assert_eq!(body["data"]["investment"]["pending_upgrade"]["package"], "Advanced");

    let (_, body) = app
        .send(
            "GET",
            &format!("/investments/{id}/reinvest/history"),
            Auth::User(&token),
            None,
        )
        .await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["source"], "PROFIT");
}

#[tokio::test]
async fn referral_commissions_unlock_and_can_be_withdrawn() {
    let app = TestApp::new().await;
    let (alice, alice_code) = app.user("alice@ref.io", None).await;
    let (bob, bob_code) = app.user("bob@ref.io", Some(&alice_code)).await;
    let (carol, _) = app.user("carol@ref.io", Some(&bob_code)).await;

    app.invest(&bob, ADVANCED, 1000.0, 3, 20).await;
    app.invest(&carol, ADVANCED, 1000.0, 3, 21).await;

    let (_, body) = app
        .send("GET", "/referrals/earnings", Auth::User(&alice), None)
        .await;
    let earnings = body["data"].as_array().unwrap();
    assert_eq!(earnings.len(), 2);
    assert!(earnings.iter().all(|e| e["amount"] == 30.0 && e["available"] == false));

    let (_, body) = app
        .send("GET", "/referrals/stats", Auth::User(&alice), None)
        .await;
    assert_eq!(body["data"]["level1_count"], 1);
    assert_eq!(body["data"]["level2_count"], 1);
    assert_eq!(body["data"]["next_referral_percent"], 4.0);
    assert_eq!(body["data"]["locked"], 60.0);

    let withdraw = json!({ "trc20_address": USER_TRON });
    let (status, _) = app
        .send("POST", "/referrals/withdraw", Auth::User(&alice), Some(withdraw.clone()))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.clock.advance(Duration::days(31));
    let (_, body) = app
        .send("GET", "/referrals/available", Auth::User(&alice), None)
        .await;
    assert_eq!(body["data"]["count"], 2);
    assert_eq!(body["data"]["total"], 60.0);

    let (status, body) = app
        .send("POST", "/referrals/withdraw", Auth::User(&alice), Some(withdraw))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let withdrawal_id = body["data"]["withdrawal_id"].as_i64().unwrap();

    let (_, body) = app
        .send("GET", "/referrals/available", Auth::User(&alice), None)
        .await;
    assert_eq!(body["data"]["count"], 0);

    let (status, _) = app
        .send(
            "POST",
            &format!("/admin/referral-withdrawals/{withdrawal_id}/reject"),
            Auth::Admin(ADMIN_KEY),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = app
        .send("GET", "/referrals/available", Auth::User(&alice), None)
        .await;
    assert_eq!(body["data"]["count"], 2);
}

#[tokio::test]
async fn referral_earnings_can_be_reinvested() {
    let app = TestApp::new().await;
    let (alice, code) = app.user("alice@re.io", None).await;
    let (bob, _) = app.user("bob@re.io", Some(&code)).await;
    let own = app.invest(&alice, STARTER, 900.0, 6, 30).await;
    app.invest(&bob, ADVANCED, 2000.0, 6, 31).await;
    app.clock.advance(Duration::days(31));

    let (status, body) = app
        .send(
            "POST",
            "/referrals/reinvest",
            Auth::User(&alice),
            Some(json!({ "investment_id": own })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["amount"], 60.0);
    assert_eq!(body["data"]["investment"]["amount"], 960.0);

    let (_, body) = app
        .send(
            "GET",
            &format!("/investments/{own}/reinvest/history"),
            Auth::User(&alice),
            None,
        )
        .await;
    assert_eq!(body["data"][0]["source"], "REFERRAL");
}

#[tokio::test]
async fn simulated_date_pins_the_investment_clock() {
    let app = TestApp::new().await;
    let (token, _) = app.user("ivan@example.com", None).await;
    let id = app.invest(&token, STARTER, 600.0, 3, 40).await;

    let (status, body) = app
        .send(
            "POST",
            "/investments/simulate-date",
            Auth::User(&token),
            Some(json!({ "investment_id": id, "simulated_date": "2025-01-31T00:00:00Z" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["days_passed"], 30);
    assert!(close(&body["data"]["current_return"], 84.0));
    assert_eq!(body["data"]["is_simulated"], true);

    let (_, body) = app
        .send(
            "POST",
            "/investments/simulate-date",
            Auth::User(&token),
            Some(json!({ "investment_id": id, "simulated_date": null })),
        )
        .await;
    assert_eq!(body["data"]["days_passed"], 0);
}

#[tokio::test]
async fn admin_stats_and_duplicate_users() {
    let app = TestApp::new().await;
    let (token, _) = app.user("judy@example.com", None).await;
    app.invest(&token, ADVANCED, 2000.0, 6, 50).await;

    let (status, _) = app
        .send(
            "POST",
            "/admin/users",
            Auth::Admin(ADMIN_KEY),
            Some(json!({ "email": "JUDY@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .send(
            "POST",
            "/admin/users",
            Auth::Admin(ADMIN_KEY),
            Some(json!({ "email": "kim@example.com", "referral_code": "NOPE0000" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send("GET", "/admin/stats", Auth::Admin(ADMIN_KEY), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["users"], 1);
    assert_eq!(body["data"]["active_investments"], 1);
    assert_eq!(body["data"]["active_principal"], 2000.0);
}
