//! Wire session against a scripted login server

use std::net::Ipv4Addr;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use wlscan::network::codec::LengthFrameCodec;
use wlscan::network::packet::{login, PacketBuilder, PacketReader};
use wlscan::network::GameVersion;
use wlscan::session::{BotConnector, KickReason, SessionEvent, WireConnector};
use wlscan::{Credential, Endpoint, ScanError};

type ServerConn = Framed<TcpStream, LengthFrameCodec>;

async fn login_server<F, Fut>(script: F) -> (Endpoint, tokio::task::JoinHandle<()>)
where
    F: FnOnce(ServerConn) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        script(Framed::new(socket, LengthFrameCodec::new())).await;
    });
    (Endpoint::new(Ipv4Addr::LOCALHOST, port), handle)
}

/// Read the handshake and Login Start, returning (protocol, username)
async fn read_login(conn: &mut ServerConn) -> (i32, String) {
    let mut handshake = PacketReader::new(conn.next().await.unwrap().unwrap());
    assert_eq!(handshake.varint().unwrap(), 0x00);
    let protocol = handshake.varint().unwrap();
    assert_eq!(handshake.string().unwrap(), "127.0.0.1");

    let mut start = PacketReader::new(conn.next().await.unwrap().unwrap());
    assert_eq!(start.varint().unwrap(), login::START);
    (protocol, start.string().unwrap())
}

#[tokio::test]
async fn test_whitelist_disconnect() {
    let (endpoint, server) = login_server(|mut conn| async move {
        let (protocol, username) = read_login(&mut conn).await;
        assert_eq!(protocol, 763);
        assert_eq!(username, "Scanner_01");
        let reason = r#"{"translate":"multiplayer.disconnect.not_whitelisted"}"#;
        conn.send(PacketBuilder::new(login::DISCONNECT).string(reason).finish())
            .await
            .unwrap();
    })
    .await;

    let mut session = WireConnector::new()
        .connect(&Credential::new("Scanner_01"), endpoint, &GameVersion::new("1.20.1", 763))
        .await
        .unwrap();

    match session.next_event().await {
        Some(SessionEvent::Kicked(reason @ KickReason::Structured(_))) => {
            assert!(reason.to_text().contains("not_whitelisted"))
        }
        other => panic!("expected a structured kick, got {:?}", other),
    }
    session.end().await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_login_through_compression_and_plugin_request() {
    let (endpoint, server) = login_server(|mut conn| async move {
        let (protocol, _) = read_login(&mut conn).await;
        assert_eq!(protocol, 765);

        conn.send(PacketBuilder::new(login::SET_COMPRESSION).varint(256).finish())
            .await
            .unwrap();
        conn.codec_mut().set_compression(256);

        conn.send(
            PacketBuilder::new(login::PLUGIN_REQUEST)
                .varint(7)
                .string("velocity:player_info")
                .finish(),
        )
        .await
        .unwrap();

        let mut reply = PacketReader::new(conn.next().await.unwrap().unwrap());
        assert_eq!(reply.varint().unwrap(), login::PLUGIN_RESPONSE);
        assert_eq!(reply.varint().unwrap(), 7);

        conn.send(PacketBuilder::new(login::SUCCESS).bytes(&[0u8; 16]).string("Scanner_01").finish())
            .await
            .unwrap();

        let mut ack = PacketReader::new(conn.next().await.unwrap().unwrap());
        assert_eq!(ack.varint().unwrap(), login::ACKNOWLEDGED);
    })
    .await;

    let mut session = WireConnector::new()
        .connect(&Credential::new("Scanner_01"), endpoint, &GameVersion::new("1.20.4", 765))
        .await
        .unwrap();

    assert_eq!(session.next_event().await, Some(SessionEvent::Login));
    session.end().await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_online_mode_server_is_an_error() {
    let (endpoint, server) = login_server(|mut conn| async move {
        read_login(&mut conn).await;
        conn.send(
            PacketBuilder::new(login::ENCRYPTION_REQUEST)
                .string("")
                .varint(0)
                .varint(0)
                .finish(),
        )
        .await
        .unwrap();
    })
    .await;

    let mut session = WireConnector::new()
        .connect(&Credential::new("Scanner_01"), endpoint, &GameVersion::new("1.20.1", 763))
        .await
        .unwrap();

    match session.next_event().await {
        Some(SessionEvent::Error(message)) => assert!(message.contains("online-mode")),
        other => panic!("expected an error event, got {:?}", other),
    }
    assert!(matches!(
        session.send_chat("hello").await,
        Err(ScanError::Unsupported(_))
    ));
    session.end().await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_server_hangup_ends_session() {
    let (endpoint, server) = login_server(|mut conn| async move {
        read_login(&mut conn).await;
    })
    .await;

    let mut session = WireConnector::new()
        .connect(&Credential::new("Scanner_01"), endpoint, &GameVersion::new("1.8.9", 47))
        .await
        .unwrap();

    server.await.unwrap();
    assert_eq!(session.next_event().await, None);
    session.end().await;
    session.end().await;
}

#[tokio::test]
async fn test_compressed_payload_is_rejected() {
    let (endpoint, server) = login_server(|mut conn| async move {
        read_login(&mut conn).await;
        conn.send(PacketBuilder::new(login::SET_COMPRESSION).varint(0).finish())
            .await
            .unwrap();
        // a frame claiming 64 inflated bytes, followed by junk
        conn.codec_mut().set_compression(-1);
        conn.send(Bytes::from_static(&[0x40, 0x78, 0x9c])).await.unwrap();
    })
    .await;

    let mut session = WireConnector::new()
        .connect(&Credential::new("Scanner_01"), endpoint, &GameVersion::new("1.20.1", 763))
        .await
        .unwrap();

    assert!(matches!(session.next_event().await, Some(SessionEvent::Error(_))));
    session.end().await;
    server.await.unwrap();
}
