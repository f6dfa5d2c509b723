//! Loan engine scenarios against the in-memory stores

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use library_server::{
    error::AppError,
    models::{Book, BookStatus, Page, Role, User, UserClaims},
    repository::memory::MemoryLoanStores,
    services::{clock::Clock, loans::LoansService},
};
use uuid::Uuid;

#[cfg(feature = "test-util")]
use library_server::repository::memory::FailPoint;

struct FixedClock;

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn now(&self) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 16, 0, 0).unwrap()
    }
}

fn reader(n: usize) -> User {
    User {
        id: Uuid::new_v4(),
        first_name: format!("Reader{}", n),
        last_name: "Test".to_string(),
        email: format!("reader{}@library.test", n),
        password: "hash".to_string(),
        birth_date: NaiveDate::from_ymd_opt(1985, 6, 15).unwrap(),
        role: Role::User,
        can_borrow: true,
    }
}

fn book(title: &str) -> Book {
    Book::new(title, NaiveDate::from_ymd_opt(1954, 7, 29).unwrap())
}

struct Library {
    stores: MemoryLoanStores,
    service: LoansService,
    books: Vec<Book>,
    users: Vec<User>,
}

async fn library(books: usize, users: usize) -> Library {
    let stores = MemoryLoanStores::new();
    let books: Vec<Book> = (0..books).map(|i| book(&format!("Volume {}", i))).collect();
    let users: Vec<User> = (0..users).map(reader).collect();

    for b in &books {
        stores.insert_book(b.clone()).await;
    }
    for u in &users {
        stores.insert_user(u.clone()).await;
    }

    let service = LoansService::new(Arc::new(stores.clone()), Arc::new(FixedClock));
    Library {
        stores,
        service,
        books,
        users,
    }
}

/// Every book and user flag must agree with the set of active loans.
async fn assert_consistent(lib: &Library) {
    let loans = lib.stores.loans().await;

    for b in &lib.books {
        let stored = lib.stores.book(b.id).await.unwrap();
        let active = loans.iter().filter(|l| l.active && l.book_id == b.id).count();
        assert!(active <= 1, "book {} has {} active loans", b.id, active);
        assert_eq!(stored.status == BookStatus::Unavailable, active == 1);
    }

    for u in &lib.users {
        let stored = lib.stores.user(u.id).await.unwrap();
        let active = loans.iter().filter(|l| l.active && l.user_id == u.id).count();
        assert!(active <= 1, "user {} has {} active loans", u.id, active);
        assert_eq!(stored.can_borrow, active == 0);
    }

    for loan in &loans {
        assert_eq!(loan.active, loan.returned_at.is_none());
    }
}

#[tokio::test]
async fn test_mixed_sequence_keeps_flags_consistent() {
    let lib = library(3, 3).await;
    let claims: Vec<UserClaims> = lib.users.iter().map(|u| UserClaims::for_user(u, 1)).collect();

    let first = lib
        .service
        .create_loan(&claims[0], lib.books[0].id, &lib.users[0].email)
        .await
        .unwrap();
    lib.service
        .create_loan(&claims[1], lib.books[1].id, &lib.users[1].email)
        .await
        .unwrap();

    // Refused attempts leave no trace
    assert!(matches!(
        lib.service
            .create_loan(&claims[2], lib.books[0].id, &lib.users[2].email)
            .await,
        Err(AppError::Conflict(_))
    ));
    assert!(matches!(
        lib.service
            .create_loan(&claims[0], lib.books[2].id, &lib.users[0].email)
            .await,
        Err(AppError::Conflict(_))
    ));
    assert_consistent(&lib).await;

    lib.service
        .return_loan(&claims[0], first.id, &lib.users[0].email)
        .await
        .unwrap();
    assert_consistent(&lib).await;

    // The returned book goes to another reader
    lib.service
        .create_loan(&claims[2], lib.books[0].id, &lib.users[2].email)
        .await
        .unwrap();
    assert_consistent(&lib).await;

    assert_eq!(lib.stores.loans().await.len(), 3);
}

#[tokio::test]
async fn test_return_then_borrow_again() {
    let lib = library(2, 1).await;
    let user = &lib.users[0];
    let claims = UserClaims::for_user(user, 1);

    let loan = lib
        .service
        .create_loan(&claims, lib.books[0].id, &user.email)
        .await
        .unwrap();
    let returned = lib.service.return_loan(&claims, loan.id, &user.email).await.unwrap();

    assert!(!returned.active);
    assert_eq!(returned.returned_at, Some(FixedClock.now()));
    assert_eq!(returned.due_date, NaiveDate::from_ymd_opt(2024, 3, 8).unwrap());

    lib.service
        .create_loan(&claims, lib.books[1].id, &user.email)
        .await
        .unwrap();

    let history = lib.service.list_by_user(&user.email, Page::default()).await.unwrap();
    assert_eq!(history.len(), 2);

    let active = lib
        .service
        .list_by_user_and_active(&user.email, true, Page::default())
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].book.id, lib.books[1].id);

    assert_consistent(&lib).await;
}

// cargo test --features test-util
#[cfg(feature = "test-util")]
#[tokio::test]
async fn test_failed_write_rolls_back_the_whole_loan() {
    for point in [FailPoint::SaveLoan, FailPoint::SaveBook, FailPoint::SaveUser] {
        let lib = library(1, 1).await;
        let user = &lib.users[0];
        let claims = UserClaims::for_user(user, 1);

        lib.stores.fail_next(point).await;
        let result = lib
            .service
            .create_loan(&claims, lib.books[0].id, &user.email)
            .await;

        assert!(result.is_err(), "{:?} should abort the loan", point);
        assert!(lib.stores.loans().await.is_empty());
        assert_consistent(&lib).await;

        // The fail point is spent, a retry succeeds
        lib.service
            .create_loan(&claims, lib.books[0].id, &user.email)
            .await
            .unwrap();
        assert_consistent(&lib).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_borrowers_get_one_loan() {
    let lib = library(1, 8).await;
    let book_id = lib.books[0].id;

    let handles: Vec<_> = lib
        .users
        .iter()
        .map(|user| {
            let service = lib.service.clone();
            let claims = UserClaims::for_user(user, 1);
            let email = user.email.clone();
            tokio::spawn(async move { service.create_loan(&claims, book_id, &email).await })
        })
        .collect();

    let mut granted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => granted += 1,
            Err(AppError::Conflict(_)) => {}
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }

    assert_eq!(granted, 1);
    assert_consistent(&lib).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_loans_for_one_user_get_one_book() {
    let lib = library(6, 1).await;
    let user = lib.users[0].clone();

    let handles: Vec<_> = lib
        .books
        .iter()
        .map(|b| {
            let service = lib.service.clone();
            let claims = UserClaims::for_user(&user, 1);
            let email = user.email.clone();
            let book_id = b.id;
            tokio::spawn(async move { service.create_loan(&claims, book_id, &email).await })
        })
        .collect();

    let mut granted = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            granted += 1;
        }
    }

    assert_eq!(granted, 1);
    assert_consistent(&lib).await;
}

#[tokio::test]
async fn test_listing_by_active_flag_is_ordered_and_paginated() {
    let lib = library(3, 3).await;

    for (u, b) in lib.users.iter().zip(&lib.books) {
        let claims = UserClaims::for_user(u, 1);
        lib.service.create_loan(&claims, b.id, &u.email).await.unwrap();
    }

    let all = lib.service.list_by_active(true, Page::default()).await.unwrap();
    assert_eq!(all.len(), 3);

    let first_page = lib.service.list_by_active(true, Page::new(Some(1), Some(2))).await.unwrap();
    let second_page = lib.service.list_by_active(true, Page::new(Some(2), Some(2))).await.unwrap();
    assert_eq!(first_page.len(), 2);
    assert_eq!(second_page.len(), 1);
    assert_eq!(first_page[0].id, all[0].id);
    assert_eq!(second_page[0].id, all[2].id);

    let returned = lib.service.list_by_active(false, Page::default()).await.unwrap();
    assert!(returned.is_empty());
}
