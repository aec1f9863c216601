//! Compile-time ABI definitions for the vault deployment via Alloy `sol!`.
//!
//! Every amount and price in these interfaces is an 18-decimal fixed-point
//! integer.

use alloy::sol;

// ---------------------------------------------------------------------------
// Price feed
// ---------------------------------------------------------------------------

sol! {
    /// Collateral price oracle, quoted in liability units per collateral unit.
    #[sol(rpc)]
    interface IPriceFeed {
        function getPrice() external view returns (uint256);
    }
}

// ---------------------------------------------------------------------------
// Collateral token (ERC-20 subset)
// ---------------------------------------------------------------------------

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

sol! {
    /// Collateralized borrowing vault.
    ///
    /// Deployments differ in how accrued interest is exposed: newer ones
    /// report it through `getVaultInfo`, older ones through
    /// `getPendingInterest` or `calculateInterest`.
    #[sol(rpc)]
    interface IVault {
        function getUserCollateral(address user) external view returns (uint256);
        function getUserDebt(address user) external view returns (uint256);

        function getVaultInfo(address user) external view returns (
            uint256 collateral,
            uint256 debt,
            uint256 pendingInterest
        );

        function getPendingInterest(address user) external view returns (uint256);
        function calculateInterest(address user) external view returns (uint256);

        /// Borrow rate in basis points per period.
        function borrowRate() external view returns (uint256);

        function deposit(uint256 amount) external;
        function borrow(uint256 amount) external;
    }
}
