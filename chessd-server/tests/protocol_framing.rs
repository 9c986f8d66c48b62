//! Framing + tagged-enum round trips over a real async duplex pipe, for
//! message shapes not already covered by `protocol.rs`'s own unit tests.

use chessd_server::protocol::{decode_message, encode_message, read_frame, write_frame, Decoded, Message, Side};
use uuid::Uuid;

#[tokio::test]
async fn game_state_message_round_trips_with_its_tag() {
    let (mut client, mut server) = tokio::io::duplex(4096);
    let message = Message::GameState {
        fen: "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1".to_string(),
        side_to_move: Side::White,
        status: "active".to_string(),
    };
    write_frame(&mut client, &encode_message(&message)).await.unwrap();
    let payload = read_frame(&mut server).await.unwrap().unwrap();

    match decode_message(&payload).unwrap() {
        Decoded::Message(Message::GameState { fen, side_to_move, status }) => {
            assert_eq!(fen, "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1");
            assert_eq!(side_to_move, Side::White);
            assert_eq!(status, "active");
        }
        other => panic!("expected GameState, got {other:?}"),
    }
}

#[tokio::test]
async fn multiple_frames_on_one_connection_are_read_in_order() {
    let (mut client, mut server) = tokio::io::duplex(4096);
    let first = Message::LoadGame { id: Uuid::new_v4() };
    let second = Message::Resign;
    write_frame(&mut client, &encode_message(&first)).await.unwrap();
    write_frame(&mut client, &encode_message(&second)).await.unwrap();

    let a = read_frame(&mut server).await.unwrap().unwrap();
    let b = read_frame(&mut server).await.unwrap().unwrap();
    assert!(matches!(decode_message(&a).unwrap(), Decoded::Message(Message::LoadGame { .. })));
    assert!(matches!(decode_message(&b).unwrap(), Decoded::Message(Message::Resign)));
}

#[tokio::test]
async fn closing_the_writer_yields_a_clean_eof() {
    let (client, mut server) = tokio::io::duplex(64);
    drop(client);
    assert!(read_frame(&mut server).await.unwrap().is_none());
}
