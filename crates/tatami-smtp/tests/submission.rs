//! Submission conversations against scripted servers.

#![allow(clippy::unwrap_used)]

use tatami_smtp::{Address, Client, Error};
use tokio_test::io::Builder;

#[tokio::test]
async fn submits_one_letter() {
    let mock = Builder::new()
        .read(b"220 smtp.example.com ESMTP ready\r\n")
        .write(b"EHLO tatami\r\n")
        .read(b"250-smtp.example.com\r\n250-AUTH PLAIN LOGIN\r\n250 8BITMIME\r\n")
        // "\0user\0pass"
        .write(b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n")
        .read(b"235 2.7.0 Authentication successful\r\n")
        .write(b"MAIL FROM:<registrar@example.com>\r\n")
        .read(b"250 OK\r\n")
        .write(b"RCPT TO:<coach@dojo.org>\r\n")
        .read(b"250 OK\r\n")
        .write(b"DATA\r\n")
        .read(b"354 End data with <CR><LF>.<CR><LF>\r\n")
        .write(b"Subject: hi\r\n\r\nhello\r\n..dot\r\n.\r\n")
        .read(b"250 queued\r\n")
        .write(b"QUIT\r\n")
        .read(b"221 bye\r\n")
        .build();

    let client = Client::from_stream(mock).await.unwrap();
    assert_eq!(client.server_info().hostname, "smtp.example.com");

    let client = client.ehlo("tatami").await.unwrap();
    let mut client = client.auth_plain("user", "pass").await.unwrap();
    client
        .send_mail(
            &Address::new("registrar@example.com").unwrap(),
            &[Address::new("coach@dojo.org").unwrap()],
            b"Subject: hi\n\nhello\n.dot\n",
        )
        .await
        .unwrap();
    client.quit().await.unwrap();
}

#[tokio::test]
async fn refused_recipient_resets_transaction() {
    let mock = Builder::new()
        .read(b"220 ready\r\n")
        .write(b"EHLO tatami\r\n")
        .read(b"250 smtp.example.com\r\n")
        .write(b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n")
        .read(b"235 ok\r\n")
        .write(b"MAIL FROM:<registrar@example.com>\r\n")
        .read(b"250 OK\r\n")
        .write(b"RCPT TO:<nobody@dojo.org>\r\n")
        .read(b"550 5.1.1 no such user\r\n")
        .write(b"RSET\r\n")
        .read(b"250 flushed\r\n")
        .build();

    let client = Client::from_stream(mock).await.unwrap();
    let mut client = client
        .ehlo("tatami")
        .await
        .unwrap()
        .auth_plain("user", "pass")
        .await
        .unwrap();

    let err = client
        .send_mail(
            &Address::new("registrar@example.com").unwrap(),
            &[Address::new("nobody@dojo.org").unwrap()],
            b"x",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Rejected { code: 550, .. }));
}

#[tokio::test]
async fn bad_credentials() {
    let mock = Builder::new()
        .read(b"220 ready\r\n")
        .write(b"EHLO tatami\r\n")
        .read(b"250-smtp.example.com\r\n250 AUTH PLAIN\r\n")
        .write(b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n")
        .read(b"535 5.7.8 credentials invalid\r\n")
        .build();

    let client = Client::from_stream(mock).await.unwrap().ehlo("tatami").await.unwrap();
    let err = client.auth_plain("user", "pass").await.unwrap_err();
    assert!(matches!(err, Error::Rejected { code: 535, .. }));
}

#[tokio::test]
async fn unavailable_greeting() {
    let mock = Builder::new().read(b"421 try again later\r\n").build();
    let err = Client::from_stream(mock).await.unwrap_err();
    assert!(err.is_transient());
}
