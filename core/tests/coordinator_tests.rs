// tests/coordinator_tests.rs
mod common;

use common::*;
use escrow::token::ClientPayload;
use escrow::{Action, EscrowError, FlowOutcome, MessageRef, OrderStatus, PlaceOrder, Stage, TokenPayload};
use serial_test::serial;
use std::sync::atomic::Ordering;

fn is_benign_at(outcome: &FlowOutcome, expected: Stage) -> bool {
  matches!(outcome, FlowOutcome::Benign { stage, .. } if *stage == expected)
}

#[tokio::test]
#[serial]
async fn test_place_order_offers_every_expert_and_gives_buyer_cancel() {
  let h = harness().await;
  let order = h.place_order().await;

  assert_eq!(order.status, OrderStatus::New);
  assert_eq!(h.tokens.outstanding(Action::Accept, order.id), 2);
  assert_eq!(h.tokens.outstanding(Action::Cancel, order.id), 1);
  assert!(h.transport.find_button(EXPERT_1_CHAT, "Take order").is_some());
  assert!(h.transport.find_button(EXPERT_2_CHAT, "Take order").is_some());
  assert!(h.transport.find_button(BUYER_CHAT, "Cancel order").is_some());
}

#[tokio::test]
#[serial]
async fn test_place_order_for_unknown_game_issues_nothing() {
  let h = harness().await;
  let err = h
    .coordinator
    .place_order(PlaceOrder {
      client_id: BUYER_ID,
      client_chat_id: BUYER_CHAT,
      game_id: 999,
      category: CATEGORY.into(),
    })
    .await
    .unwrap_err();

  assert!(matches!(err, EscrowError::NotFound(_)));
  assert!(h.orders.is_empty());
  assert!(h.tokens.is_empty());
  assert!(h.transport.log().is_empty());
}

#[tokio::test]
#[serial]
async fn test_accept_assigns_expert_opens_thread_and_kills_competing_buttons() {
  let h = harness().await;
  let order = h.place_order().await;

  let outcome = h.press(EXPERT_1_CHAT, "Take order").await.unwrap();
  assert_eq!(outcome, FlowOutcome::Completed);

  let stored = h.order(order.id).await;
  assert_eq!(stored.status, OrderStatus::Accepted);
  assert_eq!(stored.expert_id, Some(EXPERT_1));
  assert_eq!(stored.thread_id, Some(h.expert_thread()));

  // Both accept offers and the buyer's cancel are gone; the thread holds the next choice.
  assert_eq!(h.tokens.outstanding(Action::Accept, order.id), 0);
  assert_eq!(h.tokens.outstanding(Action::Cancel, order.id), 0);
  assert_eq!(h.tokens.outstanding(Action::Confirm, order.id), 1);
  assert_eq!(h.tokens.outstanding(Action::Decline, order.id), 1);
  assert_eq!(h.transport.answers(), 1);

  let by_thread = h
    .coordinator
    .services()
    .orders
    .get_active_by_thread(h.expert_thread())
    .await
    .unwrap();
  assert_eq!(by_thread.id, order.id);
  assert!(h.transport.texts_to(BUYER_CHAT).iter().any(|t| t.contains("Ann")));
}

#[tokio::test]
#[serial]
async fn test_second_expert_press_after_accept_is_benign() {
  let h = harness().await;
  let order = h.place_order().await;

  h.press(EXPERT_1_CHAT, "Take order").await.unwrap();
  let late = h.press(EXPERT_2_CHAT, "Take order").await.unwrap();

  assert!(is_benign_at(&late, Stage::Consume), "got {:?}", late);
  let stored = h.order(order.id).await;
  assert_eq!(stored.expert_id, Some(EXPERT_1));
  assert_eq!(h.transport.subchannels().len(), 1);
  // The late press is still acknowledged.
  assert_eq!(h.transport.answers(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_concurrent_accepts_assign_exactly_one_expert() {
  let h = harness().await;
  let order = h.place_order().await;

  let e1 = h.event_for(EXPERT_1_CHAT, "Take order");
  let e2 = h.event_for(EXPERT_2_CHAT, "Take order");
  let (c1, c2) = (h.coordinator.clone(), h.coordinator.clone());
  let t1 = tokio::spawn(async move { c1.dispatch(e1).await });
  let t2 = tokio::spawn(async move { c2.dispatch(e2).await });
  let r1 = t1.await.unwrap().unwrap();
  let r2 = t2.await.unwrap().unwrap();

  assert_eq!(
    [&r1, &r2].iter().filter(|o| o.is_completed()).count(),
    1,
    "outcomes: {:?} / {:?}",
    r1,
    r2
  );
  let winner = if r1.is_completed() { EXPERT_1 } else { EXPERT_2 };
  let stored = h.order(order.id).await;
  assert_eq!(stored.status, OrderStatus::Accepted);
  assert_eq!(stored.expert_id, Some(winner));
  assert_eq!(h.transport.subchannels().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_cancel_racing_accept_commits_exactly_one() {
  let h = harness().await;
  let order = h.place_order().await;

  let accept = h.event_for(EXPERT_1_CHAT, "Take order");
  let cancel = h.event_for(BUYER_CHAT, "Cancel order");
  let (c1, c2) = (h.coordinator.clone(), h.coordinator.clone());
  let t1 = tokio::spawn(async move { c1.dispatch(accept).await });
  let t2 = tokio::spawn(async move { c2.dispatch(cancel).await });
  let accepted = t1.await.unwrap().unwrap();
  let canceled = t2.await.unwrap().unwrap();

  assert_ne!(accepted.is_completed(), canceled.is_completed());
  let stored = h.order(order.id).await;
  if accepted.is_completed() {
    assert_eq!(stored.status, OrderStatus::Accepted);
    assert_eq!(stored.expert_id, Some(EXPERT_1));
  } else {
    assert_eq!(stored.status, OrderStatus::Canceled);
    assert_eq!(stored.expert_id, None);
    assert!(h.transport.subchannels().is_empty());
  }
}

#[tokio::test]
#[serial]
async fn test_duplicate_delivery_changes_state_once() {
  let h = harness().await;
  let order = h.place_order().await;

  let event = h.event_for(BUYER_CHAT, "Cancel order");
  let first = h.coordinator.dispatch(event.clone()).await.unwrap();
  let second = h.coordinator.dispatch(event).await.unwrap();

  assert_eq!(first, FlowOutcome::Completed);
  assert!(is_benign_at(&second, Stage::Consume));
  assert_eq!(h.order(order.id).await.status, OrderStatus::Canceled);
  // The expert offers died with the cancel.
  assert_eq!(h.tokens.outstanding(Action::Accept, order.id), 0);
}

#[tokio::test]
#[serial]
async fn test_full_happy_path_leaves_no_live_tokens() {
  let h = harness().await;
  let order = h.place_order().await;

  assert!(h.press(EXPERT_1_CHAT, "Take order").await.unwrap().is_completed());
  assert!(h.press(EXPERTS_CHAT, "Work done").await.unwrap().is_completed());
  assert_eq!(h.order(order.id).await.status, OrderStatus::Accepted);

  assert!(h.press(EXPERTS_CHAT, "Yes, done").await.unwrap().is_completed());
  assert_eq!(h.order(order.id).await.status, OrderStatus::ExpertConfirmed);

  assert!(h
    .press(BUYER_CHAT, "I received it, release payment")
    .await
    .unwrap()
    .is_completed());
  assert_eq!(h.order(order.id).await.status, OrderStatus::Completed);
  assert_eq!(h.tokens.outstanding(Action::Rate, order.id), 5);

  assert!(h.press(BUYER_CHAT, "5★").await.unwrap().is_completed());
  let stored = h.order(order.id).await;
  assert_eq!(stored.status, OrderStatus::Completed);
  assert_eq!(stored.rating, Some(5));
  assert!(h.tokens.is_empty(), "{} tokens left", h.tokens.len());

  let later = h.press(BUYER_CHAT, "4★").await.unwrap();
  assert!(is_benign_at(&later, Stage::Consume));
  assert_eq!(h.order(order.id).await.rating, Some(5));
}

#[tokio::test]
#[serial]
async fn test_reaffirm_back_restores_choice_then_decline_escalates_to_support() {
  let h = harness().await;
  let order = h.place_order().await;
  h.press(EXPERT_1_CHAT, "Take order").await.unwrap();

  h.press(EXPERTS_CHAT, "Decline").await.unwrap();
  assert_eq!(h.tokens.outstanding(Action::DeclinedReaffirm, order.id), 1);
  assert_eq!(h.tokens.outstanding(Action::ReaffirmBack, order.id), 1);

  assert!(h.press(EXPERTS_CHAT, "Back").await.unwrap().is_completed());
  assert_eq!(h.order(order.id).await.status, OrderStatus::Accepted);
  assert_eq!(h.tokens.outstanding(Action::DeclinedReaffirm, order.id), 0);
  assert_eq!(h.tokens.outstanding(Action::Confirm, order.id), 1);
  assert_eq!(h.tokens.outstanding(Action::Decline, order.id), 1);

  h.press(EXPERTS_CHAT, "Decline").await.unwrap();
  assert!(h.press(EXPERTS_CHAT, "Yes, decline").await.unwrap().is_completed());

  let stored = h.order(order.id).await;
  assert_eq!(stored.status, OrderStatus::Declined);
  assert!(h
    .transport
    .texts_to(SUPPORT_CHAT)
    .iter()
    .any(|t| t.contains(&stored.lookup_token)));
  assert!(h.tokens.is_empty());
}

#[tokio::test]
#[serial]
async fn test_token_replayed_under_another_action_is_rejected_and_kept() {
  let h = harness().await;
  let order = h.place_order().await;

  let (message, button) = h.transport.find_button(EXPERT_1_CHAT, "Take order").unwrap();
  let forged = button.callback_data.replacen("accept:", "cancel:", 1);
  let outcome = h.coordinator.dispatch(h.raw_event(message, &forged)).await.unwrap();

  assert!(is_benign_at(&outcome, Stage::Consume));
  assert_eq!(h.order(order.id).await.status, OrderStatus::New);
  assert_eq!(h.tokens.outstanding(Action::Accept, order.id), 2);
}

#[tokio::test]
#[serial]
async fn test_malformed_callback_data_is_only_acknowledged() {
  let h = harness().await;
  h.place_order().await;
  let before = h.tokens.len();

  let event = h.raw_event(
    MessageRef {
      chat_id: BUYER_CHAT,
      message_id: 1,
    },
    "not-a-callback",
  );
  let outcome = h.coordinator.dispatch(event).await.unwrap();

  assert!(matches!(outcome, FlowOutcome::Rejected { .. }));
  assert_eq!(h.transport.answers(), 1);
  assert_eq!(h.tokens.len(), before);
}

#[tokio::test]
#[serial]
async fn test_guard_rejects_verify_before_expert_confirms() {
  let h = harness().await;
  let order = h.place_order().await;
  h.press(EXPERT_1_CHAT, "Take order").await.unwrap();

  let data = h
    .coordinator
    .services()
    .tokens
    .create(&TokenPayload::Verify(ClientPayload {
      order_id: order.id,
      client_chat_id: BUYER_CHAT,
    }))
    .await
    .unwrap();
  let event = h.raw_event(
    MessageRef {
      chat_id: BUYER_CHAT,
      message_id: 1,
    },
    &data.render(),
  );
  let outcome = h.coordinator.dispatch(event).await.unwrap();

  assert!(is_benign_at(&outcome, Stage::Transition), "got {:?}", outcome);
  assert_eq!(h.order(order.id).await.status, OrderStatus::Accepted);
  // Notify never ran, so no rating keyboard was issued.
  assert_eq!(h.tokens.outstanding(Action::Rate, order.id), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_concurrent_rating_taps_record_one_rating() {
  let h = harness().await;
  let order = h.place_order().await;
  h.press(EXPERT_1_CHAT, "Take order").await.unwrap();
  h.press(EXPERTS_CHAT, "Work done").await.unwrap();
  h.press(EXPERTS_CHAT, "Yes, done").await.unwrap();
  h.press(BUYER_CHAT, "I received it, release payment").await.unwrap();

  let five = h.event_for(BUYER_CHAT, "5★");
  let two = h.event_for(BUYER_CHAT, "2★");
  let (c1, c2) = (h.coordinator.clone(), h.coordinator.clone());
  let t1 = tokio::spawn(async move { c1.dispatch(five).await });
  let t2 = tokio::spawn(async move { c2.dispatch(two).await });
  let r5 = t1.await.unwrap().unwrap();
  let r2 = t2.await.unwrap().unwrap();

  assert_eq!([&r5, &r2].iter().filter(|o| o.is_completed()).count(), 1);
  let expected = if r5.is_completed() { 5 } else { 2 };
  assert_eq!(h.order(order.id).await.rating, Some(expected));
}

#[tokio::test]
#[serial]
async fn test_outbound_failures_after_commit_do_not_undo_the_transition() {
  let h = harness().await;
  let order = h.place_order().await;
  let event = h.event_for(EXPERT_1_CHAT, "Take order");

  h.transport.fail_all.store(true, Ordering::SeqCst);
  let outcome = h.coordinator.dispatch(event).await.unwrap();

  assert_eq!(outcome, FlowOutcome::Completed);
  let stored = h.order(order.id).await;
  assert_eq!(stored.status, OrderStatus::Accepted);
  assert_eq!(stored.expert_id, Some(EXPERT_1));
  assert_eq!(stored.thread_id, None);
}

#[tokio::test]
#[serial]
async fn test_failed_choice_edit_resends_keyboard_into_the_thread() {
  let h = harness().await;
  let order = h.place_order().await;
  h.press(EXPERT_1_CHAT, "Take order").await.unwrap();
  let thread = h.expert_thread();
  let (stale, _) = h.transport.find_button(EXPERTS_CHAT, "Work done").unwrap();

  h.transport.fail_edits.store(true, Ordering::SeqCst);
  let outcome = h.press(EXPERTS_CHAT, "Work done").await.unwrap();
  h.transport.fail_edits.store(false, Ordering::SeqCst);
  assert_eq!(outcome, FlowOutcome::Completed);

  let log = h.transport.log();
  assert!(log.iter().any(|s| matches!(
    s,
    Sent::Message { dest, buttons, .. }
      if dest.thread_id == Some(thread) && buttons.iter().any(|b| b.text == "Yes, done")
  )));
  assert!(log.contains(&Sent::Delete(stale)));
  assert_eq!(h.tokens.outstanding(Action::Decline, order.id), 0);

  assert!(h.press(EXPERTS_CHAT, "Yes, done").await.unwrap().is_completed());
  assert_eq!(h.order(order.id).await.status, OrderStatus::ExpertConfirmed);
}

#[tokio::test]
#[serial]
async fn test_unshowable_choice_leaves_the_pressed_button_live() {
  let h = harness().await;
  let order = h.place_order().await;
  h.press(EXPERT_1_CHAT, "Take order").await.unwrap();
  let work_done = h.event_for(EXPERTS_CHAT, "Work done");
  let pressed = MessageRef {
    chat_id: work_done.chat_id,
    message_id: work_done.message_id,
  };

  h.transport.fail_all.store(true, Ordering::SeqCst);
  let outcome = h.coordinator.dispatch(work_done.clone()).await.unwrap();
  h.transport.fail_all.store(false, Ordering::SeqCst);
  assert_eq!(outcome, FlowOutcome::Completed);

  assert_eq!(h.order(order.id).await.status, OrderStatus::Accepted);
  assert_eq!(h.tokens.outstanding(Action::Confirm, order.id), 1);
  assert_eq!(h.tokens.outstanding(Action::Decline, order.id), 1);
  assert_eq!(h.tokens.outstanding(Action::ConfirmedReaffirm, order.id), 0);
  assert_eq!(h.tokens.outstanding(Action::ReaffirmBack, order.id), 0);

  // The same button, still on screen, works once the platform recovers.
  let again = h.raw_event(pressed, &work_done.data);
  assert!(h.coordinator.dispatch(again).await.unwrap().is_completed());
  assert!(h.press(EXPERTS_CHAT, "Yes, done").await.unwrap().is_completed());
  assert_eq!(h.order(order.id).await.status, OrderStatus::ExpertConfirmed);
}

#[tokio::test]
#[serial]
async fn test_thread_buttons_are_bearer_tokens_for_any_presser() {
  let h = harness().await;
  let order = h.place_order().await;
  h.press(EXPERT_1_CHAT, "Take order").await.unwrap();

  let mut event = h.event_for(EXPERTS_CHAT, "Work done");
  event.user_id = EXPERT_2;
  assert!(h.coordinator.dispatch(event).await.unwrap().is_completed());
  assert_eq!(h.tokens.outstanding(Action::ConfirmedReaffirm, order.id), 1);
  assert_eq!(h.order(order.id).await.expert_id, Some(EXPERT_1));
}

#[tokio::test]
#[serial]
async fn test_failed_acknowledgement_does_not_block_the_flow() {
  let h = harness().await;
  let order = h.place_order().await;

  h.transport.fail_answers.store(true, Ordering::SeqCst);
  let outcome = h.press(BUYER_CHAT, "Cancel order").await.unwrap();

  assert_eq!(outcome, FlowOutcome::Completed);
  assert_eq!(h.transport.answers(), 0);
  assert_eq!(h.order(order.id).await.status, OrderStatus::Canceled);
}

#[tokio::test]
#[serial]
async fn test_rate_limited_sends_are_retried() {
  let h = harness().await;
  h.transport.rate_limits_left.store(2, Ordering::SeqCst);
  h.place_order().await;

  // Two expert offers and the buyer receipt all arrive despite the rate limit.
  assert_eq!(h.transport.texts_to(EXPERT_1_CHAT).len(), 1);
  assert_eq!(h.transport.texts_to(EXPERT_2_CHAT).len(), 1);
  assert_eq!(h.transport.texts_to(BUYER_CHAT).len(), 1);
  assert_eq!(h.transport.calls.load(Ordering::SeqCst), 5);
}
