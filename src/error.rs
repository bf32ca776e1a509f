/// Validation failures for client commands.
///
/// Every variant is reported only to the originating connection as an
/// `ErrorMessage` event; none of them affects other players or the room task.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("room not found")]
    RoomNotFound,

    /// A join with an unknown name while a game is running.
    #[error("the game is already in progress")]
    GameAlreadyInProgress,

    #[error("the name \"{0}\" is already taken")]
    NameAlreadyConnected(String),

    #[error("only the host can do that")]
    NotHost,

    #[error("only the spy can guess the location")]
    NotTheSpy,

    /// Voluntary spy guess before the final 60 seconds of the round.
    #[error("you can only guess during the final minute")]
    GuessTooEarly,

    #[error("at least {0} players are required to start")]
    NotEnoughPlayers(usize),

    #[error("unknown suspect")]
    UnknownSuspect,

    #[error("that action is not allowed in the current phase")]
    WrongPhase,
}
