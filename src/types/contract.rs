//! Event ABI of the perpetual manager and the per-pool share tokens.
//!
//! Amounts are the raw on-chain values: `int128` fields are ABDK 64.64
//! fixed-point numbers, `uint256` token amounts carry their token decimals.

use alloy::sol;

sol! {
    #[derive(Debug, PartialEq, Eq)]
    struct Order {
        uint32 flags;
        uint24 iPerpetualId;
        uint16 brokerFeeTbps;
        address traderAddr;
        address brokerAddr;
        address executorAddr;
        int128 fAmount;
        int128 fLimitPrice;
        int128 fTriggerPrice;
        uint32 iDeadline;
        uint32 executionTimestamp;
    }

    #[derive(Debug, PartialEq, Eq)]
    event Trade(
        uint24 indexed perpetualId,
        address indexed trader,
        bytes16 indexed positionId,
        Order order,
        bytes32 orderDigest,
        int128 newPositionSizeBC,
        int128 price,
        int128 fFeeCCY,
        int128 fPnlCCY,
        int128 fB2C
    );

    #[derive(Debug, PartialEq, Eq)]
    event Liquidate(
        uint24 perpetualId,
        address indexed liquidator,
        address indexed trader,
        bytes16 indexed positionId,
        int128 amountLiquidatedBC,
        int128 liquidationPrice,
        int128 newPositionSizeBC,
        int128 fFeeCCY,
        int128 fPnlCCY
    );

    #[derive(Debug, PartialEq, Eq)]
    event UpdateMarginAccount(
        uint24 indexed perpetualId,
        address indexed trader,
        bytes16 indexed positionId,
        int128 fPositionBC,
        int128 fCashCC,
        int128 fLockedInValueQC,
        int128 fFundingPaymentCC,
        int128 fOpenInterestBC
    );

    #[derive(Debug, PartialEq, Eq)]
    event LiquidityAdded(
        uint8 indexed poolId,
        address indexed user,
        uint256 tokenAmount,
        uint256 shareAmount
    );

    #[derive(Debug, PartialEq, Eq)]
    event LiquidityRemoved(
        uint8 indexed poolId,
        address indexed user,
        uint256 tokenAmount,
        uint256 shareAmount
    );

    #[derive(Debug, PartialEq, Eq)]
    event LiquidityWithdrawalInitiated(
        uint8 indexed poolId,
        address indexed user,
        uint256 shareAmount
    );

    #[derive(Debug, PartialEq, Eq)]
    event SetOracles(
        uint24 indexed perpetualId,
        bytes4[2] baseQuoteS2,
        bytes4[2] baseQuoteS3
    );

    #[derive(Debug, PartialEq, Eq)]
    event P2PTransfer(
        address indexed from,
        address indexed to,
        uint256 amountD18,
        uint256 priceD18
    );
}
