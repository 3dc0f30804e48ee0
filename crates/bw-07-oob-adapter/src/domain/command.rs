//! Four-character command codes.

use std::fmt;

macro_rules! commands {
    ($($variant:ident => $code:literal,)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Command {
            $($variant,)*
        }

        impl Command {
            pub fn from_code(code: &str) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)*
                    _ => None,
                }
            }

            pub fn code(self) -> &'static str {
                match self {
                    $(Self::$variant => $code,)*
                }
            }
        }
    };
}

commands! {
    Hello => "helo",
    Response => "resp",
    Result => "rslt",

    Publish => "publ",
    Persist => "pers",
    Subscribe => "subs",
    TapSubscribe => "tsub",
    Query => "quer",
    TapQuery => "tque",
    List => "list",
    Unsubscribe => "usub",

    MakeEntity => "make",
    MakeDot => "makd",
    MakeChain => "makc",
    BuildChain => "bldc",
    SetEntity => "sete",
    RevokeObject => "revk",

    PutEntity => "pute",
    PutDot => "putd",
    PutChain => "putc",
    PutRevocation => "prvk",
    ResolveRegistryObject => "rsro",
    BcInteractionParams => "bcip",
    Transfer => "xfer",
    EntityBalance => "ebal",
    AddressBalance => "abal",
    MakeShortAlias => "mksa",
    MakeLongAlias => "mkla",
    ResolveAlias => "resa",

    NewDrOffer => "ndro",
    AcceptDrOffer => "adro",
    RevokeDrOffer => "rdro",
    RevokeDrAccept => "rdra",
    ListDrOffers => "ldro",
    UpdateSrvRecord => "usrv",
}

impl Command {
    /// Commands that wait on registry confirmation and so run off the
    /// connection's read task.
    pub fn waits_on_registry(self) -> bool {
        matches!(
            self,
            Self::PutEntity
                | Self::PutDot
                | Self::PutChain
                | Self::PutRevocation
                | Self::BuildChain
                | Self::Transfer
                | Self::MakeShortAlias
                | Self::MakeLongAlias
                | Self::NewDrOffer
                | Self::AcceptDrOffer
                | Self::RevokeDrOffer
                | Self::RevokeDrAccept
                | Self::UpdateSrvRecord
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
